//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Chat command channel settings
    #[serde(default)]
    pub channel: RawChannelConfig,

    /// Managed accounts
    #[serde(default)]
    pub accounts: Vec<RawAccount>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// How often the expiry sweep runs (default: 30)
    pub sweep_interval_seconds: Option<u64>,

    /// Minutes added by the "extend" button (default: 15)
    pub extend_step_minutes: Option<u32>,

    /// Upper bound for a single grant (default: 480)
    pub max_grant_minutes: Option<u32>,

    /// Revoke every grant when the service stops (default: true)
    pub revoke_on_exit: Option<bool>,

    /// Commands accepted per operator per minute (default: 30)
    pub operator_rate_limit_per_minute: Option<u32>,

    /// Longest a single host command may run (default: 30)
    pub host_command_timeout_seconds: Option<u64>,
}

/// Chat command channel settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawChannelConfig {
    /// Bot API token
    #[serde(default)]
    pub bot_token: String,

    /// Bot API base URL (default: https://api.telegram.org)
    pub api_base_url: Option<String>,

    /// Long-poll wait per request (default: 8)
    pub poll_timeout_seconds: Option<u64>,

    /// Network budget on top of the long-poll wait (default: 8)
    pub request_timeout_seconds: Option<u64>,

    /// Fixed pause between reconnect attempts (default: 10)
    pub reconnect_interval_seconds: Option<u64>,

    /// Attempts before warning; 0 means unlimited. Never stops the service.
    pub max_reconnect_attempts: Option<u32>,

    /// Chat user ids allowed to issue commands
    #[serde(default)]
    pub authorized_operators: Vec<i64>,
}

/// Raw managed account definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAccount {
    /// Host login name
    pub id: String,

    /// Name shown to operators (default: the id)
    pub display_name: Option<String>,

    /// Secret restored whenever access is revoked
    #[serde(default)]
    pub fallback_secret: String,
}
