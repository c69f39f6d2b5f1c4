//! logind sessions and account passwords

use async_trait::async_trait;
use curfew_host_api::{
    HostError, HostResult, LiveSession, LiveSessionId, SessionBackend, SessionState,
};
use curfew_util::{AccountId, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{DEFAULT_COMMAND_TIMEOUT, run, run_with_stdin};

/// `loginctl list-sessions -o json` row
#[derive(Debug, Deserialize)]
struct LoginctlSession {
    session: String,
    user: String,
    /// Only reported by newer systemd releases
    #[serde(default)]
    state: Option<String>,
}

/// Session backend on top of systemd-logind and shadow-utils
pub struct LinuxSessionBackend {
    command_timeout: Duration,
}

impl LinuxSessionBackend {
    /// Every `loginctl`/`chpasswd` run is killed after `command_timeout`.
    pub fn new(command_timeout: Duration) -> Self {
        if !nix::unistd::Uid::effective().is_root() {
            warn!("Not running as root; closing sessions and changing passwords will fail");
        }
        Self { command_timeout }
    }
}

impl Default for LinuxSessionBackend {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl SessionBackend for LinuxSessionBackend {
    async fn enumerate_live_sessions(&self) -> HostResult<Vec<LiveSession>> {
        let limit = self.command_timeout;
        match run("loginctl", &["list-sessions", "-o", "json"], limit).await {
            Ok(out) => match parse_json_sessions(&out) {
                Ok(sessions) => return Ok(sessions),
                Err(e) => debug!(error = %e, "loginctl JSON output unusable, using plain table"),
            },
            Err(e) => debug!(error = %e, "loginctl JSON output unavailable, using plain table"),
        }

        let out = run("loginctl", &["list-sessions", "--no-legend"], limit)
            .await
            .map_err(HostError::EnumerateFailed)?;
        Ok(parse_plain_sessions(&out))
    }

    async fn close_session(&self, id: &LiveSessionId) -> HostResult<()> {
        let args = ["terminate-session", id.as_str()];
        run("loginctl", &args, self.command_timeout)
            .await
            .map_err(|message| HostError::CloseFailed {
                session: id.clone(),
                message,
            })?;
        info!(session = %id, "Session terminated");
        Ok(())
    }

    async fn set_account_secret(&self, account: &AccountId, secret: &Secret) -> HostResult<()> {
        let line = chpasswd_line(account, secret)?;
        run_with_stdin("chpasswd", &[], Some(line.as_bytes()), self.command_timeout)
            .await
            .map_err(|message| HostError::SecretFailed {
                account: account.clone(),
                message,
            })?;
        debug!(account = %account, "Password updated");
        Ok(())
    }
}

pub fn parse_json_sessions(out: &str) -> Result<Vec<LiveSession>, serde_json::Error> {
    let rows: Vec<LoginctlSession> = serde_json::from_str(out)?;
    Ok(rows
        .into_iter()
        .map(|row| LiveSession {
            id: LiveSessionId::new(row.session),
            owner: AccountId::new(row.user),
            state: SessionState::parse(row.state.as_deref().unwrap_or("unknown")),
        })
        .collect())
}

/// Parse `SESSION UID USER ...` rows; the state column is not reliably
/// positioned in this format.
pub fn parse_plain_sessions(out: &str) -> Vec<LiveSession> {
    out.lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let session = cols.next()?;
            let _uid = cols.next()?;
            let user = cols.next()?;
            Some(LiveSession {
                id: LiveSessionId::new(session),
                owner: AccountId::new(user),
                state: SessionState::parse("unknown"),
            })
        })
        .collect()
}

fn chpasswd_line(account: &AccountId, secret: &Secret) -> HostResult<String> {
    let bad = |c: char| c == '\n' || c == '\r';
    if account.as_str().contains(':') || account.as_str().contains(bad) {
        return Err(HostError::SecretFailed {
            account: account.clone(),
            message: "account name not usable with chpasswd".into(),
        });
    }
    if secret.is_empty() || secret.expose().contains(bad) {
        return Err(HostError::SecretFailed {
            account: account.clone(),
            message: "secret must be a single non-empty line".into(),
        });
    }
    Ok(format!("{}:{}\n", account, secret.expose()))
}
