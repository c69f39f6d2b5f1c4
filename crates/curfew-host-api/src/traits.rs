//! Host collaborator traits

use async_trait::async_trait;
use curfew_util::{AccountId, Secret};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors from host operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Session enumeration failed: {0}")]
    EnumerateFailed(String),

    #[error("Failed to close session {session}: {message}")]
    CloseFailed {
        session: LiveSessionId,
        message: String,
    },

    #[error("Failed to set secret for {account}: {message}")]
    SecretFailed { account: AccountId, message: String },

    #[error("Shutdown request failed: {0}")]
    ShutdownFailed(String),

    #[error("{operation} did not finish within {}s", .limit.as_secs())]
    TimedOut {
        operation: &'static str,
        limit: Duration,
    },
}

pub type HostResult<T> = Result<T, HostError>;

/// Opaque backend identifier of a login session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveSessionId(String);

impl LiveSessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LiveSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse state of a live session as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Online,
    Closing,
    Other(String),
}

impl SessionState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "active" => SessionState::Active,
            "online" => SessionState::Online,
            "closing" => SessionState::Closing,
            other => SessionState::Other(other.to_string()),
        }
    }
}

/// A login session currently known to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSession {
    pub id: LiveSessionId,
    pub owner: AccountId,
    pub state: SessionState,
}

/// Enforcement primitives on the host's login sessions and account secrets
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// List every live login session on the host
    async fn enumerate_live_sessions(&self) -> HostResult<Vec<LiveSession>>;

    /// Force a session closed
    async fn close_session(&self, id: &LiveSessionId) -> HostResult<()>;

    /// Replace the secret used to authenticate as `account`
    async fn set_account_secret(&self, account: &AccountId, secret: &Secret) -> HostResult<()>;
}

/// Host power-off facility
#[async_trait]
pub trait ShutdownPrimitive: Send + Sync {
    /// Power off after `delay`, broadcasting `message` to logged-in users
    async fn initiate(&self, delay: Duration, message: &str) -> HostResult<()>;

    /// Abort a pending power-off
    async fn abort(&self) -> HostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_parse() {
        assert_eq!(SessionState::parse("active"), SessionState::Active);
        assert_eq!(SessionState::parse("Online"), SessionState::Online);
        assert_eq!(
            SessionState::parse("lingering"),
            SessionState::Other("lingering".into())
        );
    }
}
