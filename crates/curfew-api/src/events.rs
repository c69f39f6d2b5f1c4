//! Inbound events from the chat platform

use curfew_util::{ChatId, MessageId, OperatorId};

use crate::Action;

/// An event delivered by the command channel, already decoded from the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A typed text message
    Text {
        operator: OperatorId,
        chat: ChatId,
        message: MessageId,
        text: String,
    },

    /// An inline button press
    Button {
        operator: OperatorId,
        chat: ChatId,
        /// The message carrying the keyboard, if the platform still knows it
        message: Option<MessageId>,
        callback_id: String,
        action: Action,
    },
}

impl InboundEvent {
    pub fn operator(&self) -> OperatorId {
        match self {
            InboundEvent::Text { operator, .. } | InboundEvent::Button { operator, .. } => {
                *operator
            }
        }
    }

    pub fn chat(&self) -> ChatId {
        match self {
            InboundEvent::Text { chat, .. } | InboundEvent::Button { chat, .. } => *chat,
        }
    }

    /// Short description for logs
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Text { .. } => "text",
            InboundEvent::Button { .. } => "button",
        }
    }
}
