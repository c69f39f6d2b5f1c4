//! Configuration validation

use crate::schema::{RawAccount, RawConfig};
use curfew_api::{MAX_ACTION_LEN, RESERVED_ACCOUNT_IDS};
use std::collections::HashSet;
use thiserror::Error;

/// Tokens shipped in sample configs
const PLACEHOLDER_TOKENS: &[&str] = &["YOUR_BOT_TOKEN_HERE", "CHANGE_ME", "changeme"];

/// Longest action prefix an account id is embedded in (`resetpw_`)
const LONGEST_ACCOUNT_PREFIX: usize = 8;

/// Hard upper bound for a single grant, in minutes
pub const GRANT_MINUTES_CEILING: u32 = 480;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Account '{account_id}': {message}")]
    AccountError { account_id: String, message: String },

    #[error("Duplicate account ID: {0}")]
    DuplicateAccountId(String),

    #[error("Bot token is not configured")]
    MissingBotToken,

    #[error("No authorized operators configured")]
    NoOperators,

    #[error("No managed accounts configured")]
    NoAccounts,

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let token = config.channel.bot_token.trim();
    if token.is_empty() || PLACEHOLDER_TOKENS.contains(&token) {
        errors.push(ValidationError::MissingBotToken);
    }

    if config.channel.authorized_operators.is_empty() {
        errors.push(ValidationError::NoOperators);
    }

    if config.accounts.is_empty() {
        errors.push(ValidationError::NoAccounts);
    }

    let mut seen_ids = HashSet::new();
    for account in &config.accounts {
        if !seen_ids.insert(&account.id) {
            errors.push(ValidationError::DuplicateAccountId(account.id.clone()));
        }
    }

    for account in &config.accounts {
        errors.extend(validate_account(account));
    }

    if config.service.sweep_interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "sweep_interval_seconds must be greater than 0".into(),
        ));
    }

    if config.service.host_command_timeout_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "host_command_timeout_seconds must be greater than 0".into(),
        ));
    }

    if config.service.extend_step_minutes == Some(0) {
        errors.push(ValidationError::GlobalError(
            "extend_step_minutes must be greater than 0".into(),
        ));
    }

    if let Some(max) = config.service.max_grant_minutes
        && (max == 0 || max > GRANT_MINUTES_CEILING)
    {
        errors.push(ValidationError::GlobalError(format!(
            "max_grant_minutes must be between 1 and {}",
            GRANT_MINUTES_CEILING
        )));
    }

    if config.service.operator_rate_limit_per_minute == Some(0) {
        errors.push(ValidationError::GlobalError(
            "operator_rate_limit_per_minute must be greater than 0".into(),
        ));
    }

    if config.channel.reconnect_interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "reconnect_interval_seconds must be greater than 0".into(),
        ));
    }

    if let Some(url) = &config.channel.api_base_url
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        errors.push(ValidationError::GlobalError(format!(
            "api_base_url must be an http(s) URL, got '{}'",
            url
        )));
    }

    errors
}

fn validate_account(account: &RawAccount) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let err = |message: String| ValidationError::AccountError {
        account_id: account.id.clone(),
        message,
    };

    if let Err(message) = check_account_id(&account.id) {
        errors.push(err(message));
    }

    if account.fallback_secret.is_empty() {
        errors.push(err("fallback_secret cannot be empty".into()));
    }

    if account
        .display_name
        .as_ref()
        .is_some_and(|n| n.trim().is_empty())
    {
        errors.push(err("display_name cannot be blank".into()));
    }

    errors
}

/// Account ids end up inside button payloads and command lines
pub fn check_account_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("id cannot be empty".into());
    }

    let max_len = MAX_ACTION_LEN - LONGEST_ACCOUNT_PREFIX;
    if id.len() > max_len {
        return Err(format!("id must be at most {} characters", max_len));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
    {
        return Err("id may only contain a-z, 0-9, '.', '_' and '-'".into());
    }

    if id.starts_with('-') {
        return Err("id cannot start with '-'".into());
    }

    if RESERVED_ACCOUNT_IDS.contains(&id) {
        return Err(format!("'{}' is a reserved word", id));
    }

    Ok(())
}
