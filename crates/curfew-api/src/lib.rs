//! Protocol types for the curfew command channel
//!
//! This crate defines the channel-neutral vocabulary shared by the
//! transport, the dispatcher and the notifier:
//! - Actions (button payloads and their compact wire form)
//! - Inbound events (operator -> service)
//! - Outbound messages and inline keyboards (service -> operator)

mod actions;
mod events;
mod types;

pub use actions::*;
pub use events::*;
pub use types::*;

/// Maximum size of an encoded action, imposed by chat platforms on button payloads
pub const MAX_ACTION_LEN: usize = 64;
