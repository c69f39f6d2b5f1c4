//! Command channel for curfew
//!
//! This crate keeps the service reachable from the chat platform:
//! - `ChatTransport`, the abstract inbound/outbound primitive, and its
//!   Bot API implementation over HTTPS long-polling
//! - Error classification into critical (reconnect) and recoverable (skip)
//! - The reconnect loop with an injectable backoff policy
//! - A mock transport for tests

mod backoff;
mod channel;
mod error;
mod mock;
mod telegram;
mod transport;

pub use backoff::*;
pub use channel::*;
pub use error::*;
pub use mock::*;
pub use telegram::*;
pub use transport::*;
