//! Linux host backend for curfew
//!
//! Provides:
//! - Login session enumeration and termination through `loginctl`
//! - Account password rotation through `chpasswd`
//! - Host power-off through `shutdown`
//!
//! All of these need root; the service warns at start-up when it lacks it.

mod command;
mod power;
mod sessions;

pub use command::DEFAULT_COMMAND_TIMEOUT;
pub use power::*;
pub use sessions::*;
