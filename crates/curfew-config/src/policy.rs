//! Validated policy structures

use crate::schema::{RawAccount, RawChannelConfig, RawConfig, RawServiceConfig};
use crate::validation::GRANT_MINUTES_CEILING;
use curfew_util::{AccountId, OperatorId, Secret, minutes};
use std::time::Duration;

/// Validated policy ready for use by the service
#[derive(Debug, Clone)]
pub struct Policy {
    pub service: ServiceConfig,
    pub channel: ChannelConfig,
    pub accounts: Vec<ManagedAccount>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            channel: ChannelConfig::from_raw(raw.channel),
            accounts: raw.accounts.into_iter().map(ManagedAccount::from_raw).collect(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub sweep_interval: Duration,
    pub extend_step: Duration,
    pub max_grant_minutes: u32,
    pub revoke_on_exit: bool,
    pub operator_rate_limit_per_minute: u32,
    pub host_command_timeout: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            sweep_interval: Duration::from_secs(raw.sweep_interval_seconds.unwrap_or(30)),
            extend_step: minutes(raw.extend_step_minutes.unwrap_or(15)),
            max_grant_minutes: raw.max_grant_minutes.unwrap_or(GRANT_MINUTES_CEILING),
            revoke_on_exit: raw.revoke_on_exit.unwrap_or(true),
            operator_rate_limit_per_minute: raw.operator_rate_limit_per_minute.unwrap_or(30),
            host_command_timeout: Duration::from_secs(
                raw.host_command_timeout_seconds.unwrap_or(30),
            ),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Command channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub bot_token: Secret,
    pub api_base_url: String,
    pub poll_timeout: Duration,
    pub request_timeout: Duration,
    pub reconnect_interval: Duration,
    /// None means unlimited
    pub max_reconnect_attempts: Option<u32>,
    pub authorized_operators: Vec<OperatorId>,
}

impl ChannelConfig {
    fn from_raw(raw: RawChannelConfig) -> Self {
        Self {
            bot_token: Secret::new(raw.bot_token.trim()),
            api_base_url: raw
                .api_base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.telegram.org".into()),
            poll_timeout: Duration::from_secs(raw.poll_timeout_seconds.unwrap_or(8)),
            request_timeout: Duration::from_secs(raw.request_timeout_seconds.unwrap_or(8)),
            reconnect_interval: Duration::from_secs(raw.reconnect_interval_seconds.unwrap_or(10)),
            max_reconnect_attempts: raw.max_reconnect_attempts.filter(|&n| n > 0),
            authorized_operators: raw
                .authorized_operators
                .into_iter()
                .map(OperatorId::new)
                .collect(),
        }
    }
}

/// A managed (child) account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedAccount {
    pub id: AccountId,
    pub display_name: String,
    pub fallback_secret: Secret,
}

impl ManagedAccount {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, secret: &str) -> Self {
        Self {
            id: AccountId::new(id),
            display_name: display_name.into(),
            fallback_secret: Secret::new(secret),
        }
    }

    fn from_raw(raw: RawAccount) -> Self {
        let display_name = raw.display_name.unwrap_or_else(|| raw.id.clone());
        Self {
            id: AccountId::new(raw.id),
            display_name,
            fallback_secret: Secret::new(raw.fallback_secret),
        }
    }
}
