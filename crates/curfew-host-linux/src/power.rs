//! Host power-off via `shutdown`

use async_trait::async_trait;
use curfew_host_api::{HostError, HostResult, ShutdownPrimitive};
use std::time::Duration;
use tracing::info;

use crate::command::{DEFAULT_COMMAND_TIMEOUT, run};

pub struct LinuxShutdown {
    command_timeout: Duration,
}

impl LinuxShutdown {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }
}

impl Default for LinuxShutdown {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

/// `shutdown` takes whole minutes; partial minutes round up.
pub fn shutdown_args(delay: Duration, message: &str) -> Vec<String> {
    let minutes = delay.as_secs().div_ceil(60);
    let when = if minutes == 0 {
        "now".to_string()
    } else {
        format!("+{}", minutes)
    };
    vec!["-h".into(), when, message.to_string()]
}

#[async_trait]
impl ShutdownPrimitive for LinuxShutdown {
    async fn initiate(&self, delay: Duration, message: &str) -> HostResult<()> {
        let args = shutdown_args(delay, message);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run("shutdown", &args, self.command_timeout)
            .await
            .map_err(HostError::ShutdownFailed)?;
        info!(delay_secs = delay.as_secs(), "Host shutdown requested");
        Ok(())
    }

    async fn abort(&self) -> HostResult<()> {
        run("shutdown", &["-c"], self.command_timeout)
            .await
            .map_err(HostError::ShutdownFailed)?;
        info!("Host shutdown aborted");
        Ok(())
    }
}
