//! Channel errors and their classification

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bot API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Malformed update {update_id}: {reason}")]
    Malformed { update_id: i64, reason: String },

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,

    #[error("Request timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// How the reconnect loop reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Tear down the connection and reconnect after backoff
    Critical,
    /// Log, skip the offending event, keep serving
    Recoverable,
}

/// Lower-cased fragments that mark a free-form error as connection-fatal
const CRITICAL_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection lost",
    "connection closed",
    "timeout",
    "network is unreachable",
    "no route to host",
    "unauthorized",
    "forbidden",
    "no such host",
    "i/o timeout",
    "context deadline exceeded",
    "broken pipe",
    "eof",
    "network",
    "dial tcp",
    "read: connection",
];

pub fn classify(error: &ChannelError) -> ErrorClass {
    match error {
        ChannelError::Http(_) | ChannelError::Closed | ChannelError::Timeout => {
            ErrorClass::Critical
        }
        ChannelError::Api { code, .. } => match code {
            401 | 403 | 404 | 409 | 429 => ErrorClass::Critical,
            c if *c >= 500 => ErrorClass::Critical,
            _ => ErrorClass::Recoverable,
        },
        ChannelError::Malformed { .. } | ChannelError::Decode(_) => ErrorClass::Recoverable,
        ChannelError::Other(message) => classify_message(message),
    }
}

/// Pattern-match an error message against the critical list, case-insensitively
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if CRITICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorClass::Critical
    } else {
        ErrorClass::Recoverable
    }
}

impl ChannelError {
    pub fn class(&self) -> ErrorClass {
        classify(self)
    }

    pub fn is_critical(&self) -> bool {
        self.class() == ErrorClass::Critical
    }
}
