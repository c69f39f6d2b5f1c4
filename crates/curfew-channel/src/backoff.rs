//! Reconnect backoff policies

use std::time::Duration;

/// Decides how long to wait before reconnect attempt `attempt` (1-based)
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Same wait before every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    interval: Duration,
}

impl FixedBackoff {
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// No wait at all; for tests.
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}
