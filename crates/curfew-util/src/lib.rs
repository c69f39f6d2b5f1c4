//! Shared utilities for curfew
//!
//! This crate provides:
//! - ID types (AccountId, OperatorId, ChatId, MessageId)
//! - A redacting `Secret` wrapper for account credentials
//! - Time utilities (wall clock, duration formatting)
//! - Rate limiting helpers
//! - Default paths for the configuration file

mod ids;
mod paths;
mod rate_limit;
mod secret;
mod time;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use secret::*;
pub use time::*;
