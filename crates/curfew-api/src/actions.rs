//! Button actions and their wire encoding
//!
//! Actions travel as short strings attached to inline buttons, e.g.
//! `grant_kid1`, `duration_30`, `lock_all`. Fixed words are matched before
//! prefixed forms, so account ids must not collide with them (see config
//! validation for the reserved words).

use curfew_util::AccountId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Account ids that would be shadowed by fixed actions
pub const RESERVED_ACCOUNT_IDS: &[&str] = &["all", "menu", "custom"];

/// A duration picked from the duration menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationChoice {
    Minutes(u32),
    /// Ask the operator to type a number of minutes
    Custom,
}

/// Everything an operator can trigger with a button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MainMenu,

    // Access grants
    GrantMenu,
    SelectAccount(AccountId),
    Duration(DurationChoice),

    // Revocation
    LockMenu,
    Lock(AccountId),
    LockAll,
    Extend(AccountId),

    // Fallback secrets
    ResetSecretMenu,
    ResetSecret(AccountId),
    ResetAllSecrets,

    // Host power
    ComputerMenu,
    ComputerStatus,
    ShutdownNow,
    ShutdownMenu,
    ShutdownIn(u32),
    CancelShutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionParseError {
    #[error("Unknown action: {0}")]
    Unknown(String),

    #[error("Invalid number in action '{0}'")]
    InvalidNumber(String),

    #[error("Missing account in action '{0}'")]
    MissingAccount(String),
}

impl Action {
    /// Encode into the compact wire form
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MainMenu => f.write_str("main_menu"),
            Action::GrantMenu => f.write_str("grant_menu"),
            Action::SelectAccount(id) => write!(f, "grant_{}", id),
            Action::Duration(DurationChoice::Minutes(m)) => write!(f, "duration_{}", m),
            Action::Duration(DurationChoice::Custom) => f.write_str("duration_custom"),
            Action::LockMenu => f.write_str("lock_menu"),
            Action::Lock(id) => write!(f, "lock_{}", id),
            Action::LockAll => f.write_str("lock_all"),
            Action::Extend(id) => write!(f, "extend_{}", id),
            Action::ResetSecretMenu => f.write_str("resetpw_menu"),
            Action::ResetSecret(id) => write!(f, "resetpw_{}", id),
            Action::ResetAllSecrets => f.write_str("resetpw_all"),
            Action::ComputerMenu => f.write_str("computer_menu"),
            Action::ComputerStatus => f.write_str("computer_status"),
            Action::ShutdownNow => f.write_str("shutdown_now"),
            Action::ShutdownMenu => f.write_str("shutdown_menu"),
            Action::ShutdownIn(m) => write!(f, "shutdown_{}", m),
            Action::CancelShutdown => f.write_str("cancel_shutdown"),
        }
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fixed = match s {
            "main_menu" => Some(Action::MainMenu),
            "grant_menu" => Some(Action::GrantMenu),
            "duration_custom" => Some(Action::Duration(DurationChoice::Custom)),
            "lock_menu" => Some(Action::LockMenu),
            "lock_all" => Some(Action::LockAll),
            "resetpw_menu" => Some(Action::ResetSecretMenu),
            "resetpw_all" => Some(Action::ResetAllSecrets),
            "computer_menu" => Some(Action::ComputerMenu),
            "computer_status" => Some(Action::ComputerStatus),
            "shutdown_now" => Some(Action::ShutdownNow),
            "shutdown_menu" => Some(Action::ShutdownMenu),
            "cancel_shutdown" => Some(Action::CancelShutdown),
            _ => None,
        };
        if let Some(action) = fixed {
            return Ok(action);
        }

        if let Some(rest) = s.strip_prefix("duration_") {
            return parse_minutes(s, rest).map(|m| Action::Duration(DurationChoice::Minutes(m)));
        }
        if let Some(rest) = s.strip_prefix("shutdown_") {
            return parse_minutes(s, rest).map(Action::ShutdownIn);
        }
        if let Some(rest) = s.strip_prefix("grant_") {
            return parse_account(s, rest).map(Action::SelectAccount);
        }
        if let Some(rest) = s.strip_prefix("lock_") {
            return parse_account(s, rest).map(Action::Lock);
        }
        if let Some(rest) = s.strip_prefix("extend_") {
            return parse_account(s, rest).map(Action::Extend);
        }
        if let Some(rest) = s.strip_prefix("resetpw_") {
            return parse_account(s, rest).map(Action::ResetSecret);
        }

        Err(ActionParseError::Unknown(s.to_string()))
    }
}

fn parse_minutes(raw: &str, digits: &str) -> Result<u32, ActionParseError> {
    digits
        .parse::<u32>()
        .map_err(|_| ActionParseError::InvalidNumber(raw.to_string()))
}

fn parse_account(raw: &str, id: &str) -> Result<AccountId, ActionParseError> {
    if id.is_empty() {
        return Err(ActionParseError::MissingAccount(raw.to_string()));
    }
    Ok(AccountId::new(id))
}
