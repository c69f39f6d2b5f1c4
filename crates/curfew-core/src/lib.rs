//! Core access-control engine for curfew
//!
//! This crate owns the authoritative in-memory state of the service:
//! - The session registry (active grants and their expiry timers)
//! - The periodic expiry sweep that backs up the timers
//! - The shutdown schedule
//!
//! Nothing here is persisted; a restart clears all grants.

mod events;
mod registry;
mod shutdown;
mod sweeper;

pub use events::*;
pub use registry::*;
pub use shutdown::*;
pub use sweeper::*;
