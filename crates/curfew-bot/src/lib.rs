//! Operator-facing side of curfew
//!
//! Turns inbound chat events into registry and shutdown operations, keeps
//! per-chat conversation state, renders menus, and relays expiry events to
//! every authorized operator.

mod conversation;
mod dispatcher;
mod menus;
mod notifier;

pub use conversation::*;
pub use dispatcher::*;
pub use menus::*;
pub use notifier::*;
