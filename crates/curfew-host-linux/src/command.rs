//! External command helpers

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default limit for one host command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `program` and return its stdout, or a message describing the failure
pub(crate) async fn run(program: &str, args: &[&str], limit: Duration) -> Result<String, String> {
    run_with_stdin(program, args, None, limit).await
}

/// Run `program`, optionally feeding `stdin`, and return its stdout.
///
/// The child is killed if it has not exited within `limit`.
pub(crate) async fn run_with_stdin(
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
    limit: Duration,
) -> Result<String, String> {
    match tokio::time::timeout(limit, spawn_and_wait(program, args, stdin)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(program, limit_secs = limit.as_secs(), "Host command timed out");
            Err(format!("{} timed out after {}s", program, limit.as_secs()))
        }
    }
}

async fn spawn_and_wait(
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<String, String> {
    debug!(program, ?args, "Running host command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to run {}: {}", program, e))?;

    if let Some(input) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        pipe.write_all(input)
            .await
            .map_err(|e| format!("failed to write to {}: {}", program, e))?;
        // Closing stdin lets the program see end of input
        drop(pipe);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("failed to wait for {}: {}", program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
