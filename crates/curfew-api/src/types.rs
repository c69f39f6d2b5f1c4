//! Outbound message types

use curfew_util::{ChatId, MessageId};

use crate::Action;

/// A button on an inline keyboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Inline keyboard attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row with a single button
    pub fn button(mut self, label: impl Into<String>, action: Action) -> Self {
        self.rows.push(vec![Button::new(label, action)]);
        self
    }

    /// Append a row of buttons
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    /// Iterate every action on the keyboard
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.rows.iter().flatten().map(|b| &b.action)
    }
}

/// A message to deliver to an operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat: ChatId,
    pub text: String,
    pub keyboard: Option<Keyboard>,
    /// When set, edit this message in place instead of sending a new one
    pub replace: Option<MessageId>,
}

impl OutboundMessage {
    pub fn new(chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat,
            text: text.into(),
            keyboard: None,
            replace: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn replacing(mut self, message: Option<MessageId>) -> Self {
        self.replace = message;
        self
    }
}
