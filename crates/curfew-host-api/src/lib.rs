//! Host collaborator interfaces for curfew
//!
//! This crate defines the boundary between the access-control core and the
//! operating system: enumerating and closing login sessions, rotating account
//! secrets, and scheduling a host shutdown. It contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
