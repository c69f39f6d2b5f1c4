//! Periodic expiry backstop
//!
//! Per-grant timers are the primary expiry path. The sweep catches grants
//! whose timer never ran, for example after the host was suspended.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::{ExpiryTrigger, SessionRegistry};

pub struct ExpirySweeper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(registry: Arc<SessionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Lock every grant past its deadline. Returns how many this sweep removed.
    pub async fn sweep_once(&self) -> usize {
        let expired = self.registry.expired_grants().await;
        if expired.is_empty() {
            return 0;
        }

        debug!(count = expired.len(), "Sweep found expired grants");

        let mut removed = 0;
        for grant in &expired {
            if self.registry.expire(grant, ExpiryTrigger::Sweep).await {
                removed += 1;
            }
        }
        removed
    }

    /// Sweep on every tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    // A sweep can wait on the registry lock; cancellation must not.
                    tokio::select! {
                        removed = self.sweep_once() => {
                            if removed > 0 {
                                info!(removed, "Sweep revoked expired grants");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }
}
