//! Core events emitted by the registry

use curfew_util::AccountId;
use std::fmt;

/// Which expiry path revoked a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryTrigger {
    /// The grant's own deferred timer
    Timer,
    /// The periodic backstop sweep
    Sweep,
}

impl fmt::Display for ExpiryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryTrigger::Timer => f.write_str("timer"),
            ExpiryTrigger::Sweep => f.write_str("sweep"),
        }
    }
}

/// Events emitted by the core for operators to hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A grant ran out and access was revoked
    GrantExpired {
        account: AccountId,
        display_name: String,
        trigger: ExpiryTrigger,
        sessions_closed: usize,
    },

    /// A grant ran out but revocation hit backend errors
    EnforcementFailed {
        account: AccountId,
        display_name: String,
        failures: Vec<String>,
    },
}
