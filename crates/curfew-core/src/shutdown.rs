//! Host shutdown scheduling

use chrono::{DateTime, Local};
use curfew_host_api::{HostError, ShutdownPrimitive};
use curfew_util::{format_clock_time, minutes};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("Shutdown primitive failed: {0}")]
    Primitive(#[from] HostError),
}

pub type ShutdownResult<T> = Result<T, ShutdownError>;

/// Current schedule as seen by the service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSchedule {
    pub scheduled_at: Option<DateTime<Local>>,
    pub cancelled: bool,
}

impl ShutdownSchedule {
    fn is_pending(&self, now: DateTime<Local>) -> bool {
        !self.cancelled && self.scheduled_at.is_some_and(|at| at > now)
    }
}

/// Broadcast text for a shutdown `minutes` from now
pub fn shutdown_message(minutes: u32) -> String {
    format!(
        "Computer will shut down in {} minutes. This shutdown was initiated by the parental control bot.",
        minutes
    )
}

/// Schedules and cancels host power-off
pub struct ShutdownScheduler {
    primitive: Arc<dyn ShutdownPrimitive>,
    schedule: Mutex<ShutdownSchedule>,
}

impl ShutdownScheduler {
    pub fn new(primitive: Arc<dyn ShutdownPrimitive>) -> Self {
        Self {
            primitive,
            schedule: Mutex::new(ShutdownSchedule::default()),
        }
    }

    /// Power off the host in `delay_minutes`. Replaces any prior schedule.
    pub async fn schedule_shutdown(&self, delay_minutes: u32) -> ShutdownResult<DateTime<Local>> {
        let mut schedule = self.schedule.lock().await;
        let delay = minutes(delay_minutes);

        self.primitive
            .initiate(delay, &shutdown_message(delay_minutes))
            .await
            .inspect_err(|e| warn!(error = %e, delay_minutes, "Failed to schedule shutdown"))?;

        let at = curfew_util::wall_deadline(delay);
        if schedule.is_pending(curfew_util::now()) {
            debug!("Replacing existing shutdown schedule");
        }
        *schedule = ShutdownSchedule {
            scheduled_at: Some(at),
            cancelled: false,
        };

        info!(delay_minutes, at = %format_clock_time(&at), "Shutdown scheduled");
        Ok(at)
    }

    pub async fn shutdown_now(&self) -> ShutdownResult<DateTime<Local>> {
        self.schedule_shutdown(0).await
    }

    /// Cancel a pending shutdown. Returns false if there was nothing to cancel.
    pub async fn cancel_shutdown(&self) -> ShutdownResult<bool> {
        let mut schedule = self.schedule.lock().await;

        if schedule.cancelled || schedule.scheduled_at.is_none() {
            debug!("No shutdown to cancel");
            return Ok(false);
        }

        self.primitive
            .abort()
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to cancel shutdown"))?;

        schedule.cancelled = true;
        schedule.scheduled_at = None;
        info!("Shutdown cancelled");
        Ok(true)
    }

    pub async fn is_scheduled(&self) -> bool {
        self.schedule.lock().await.is_pending(curfew_util::now())
    }

    pub async fn scheduled_at(&self) -> Option<DateTime<Local>> {
        let schedule = self.schedule.lock().await;
        if schedule.is_pending(curfew_util::now()) {
            schedule.scheduled_at
        } else {
            None
        }
    }
}
