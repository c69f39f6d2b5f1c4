//! Per-chat conversation state

use curfew_util::{AccountId, ChatId};
use std::collections::HashMap;

/// Where a chat is in the grant flow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    /// An account was picked and the duration menu is about to be shown
    AccountSelected { account: AccountId },
    /// The duration menu is on screen
    AwaitingDuration { account: AccountId },
    /// The operator was asked to type a number of minutes
    AwaitingCustomDuration { account: AccountId },
}

impl ConversationState {
    /// The account this conversation is about, if any
    pub fn account(&self) -> Option<&AccountId> {
        match self {
            ConversationState::Idle => None,
            ConversationState::AccountSelected { account }
            | ConversationState::AwaitingDuration { account }
            | ConversationState::AwaitingCustomDuration { account } => Some(account),
        }
    }
}

/// Conversation state for every chat; absent means Idle
#[derive(Debug, Default)]
pub struct Conversations {
    chats: HashMap<ChatId, ConversationState>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat: ChatId) -> ConversationState {
        self.chats.get(&chat).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, chat: ChatId, state: ConversationState) {
        if state == ConversationState::Idle {
            self.chats.remove(&chat);
        } else {
            self.chats.insert(chat, state);
        }
    }

    /// Reset to Idle, returning what was there
    pub fn take(&mut self, chat: ChatId) -> ConversationState {
        self.chats.remove(&chat).unwrap_or_default()
    }

    /// Chats not in Idle
    pub fn active(&self) -> usize {
        self.chats.len()
    }
}
