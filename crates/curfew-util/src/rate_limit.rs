//! Rate limiting utilities

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::OperatorId;

/// Simple token-bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum tokens (requests) per bucket
    max_tokens: u32,
    /// How often tokens are replenished
    refill_interval: Duration,
    /// Per-operator state
    operators: HashMap<OperatorId, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests allowed per interval
    /// * `interval` - Time interval for the limit
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            operators: HashMap::new(),
        }
    }

    /// Check if a request should be allowed for the given operator
    ///
    /// Returns `true` if allowed, `false` if rate limited
    pub fn check(&mut self, operator: OperatorId) -> bool {
        let now = Instant::now();

        let bucket = self.operators.entry(operator).or_insert(Bucket {
            tokens: self.max_tokens,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill);
        if elapsed >= self.refill_interval {
            let intervals = (elapsed.as_millis() / self.refill_interval.as_millis().max(1)) as u32;
            bucket.tokens = bucket
                .tokens
                .saturating_add(intervals.saturating_mul(self.max_tokens))
                .min(self.max_tokens);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }
}
