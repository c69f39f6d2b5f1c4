//! Default paths for curfew components
//!
//! The service manages host accounts and therefore runs as root; its
//! configuration lives under `/etc` unless overridden.

use std::path::PathBuf;

/// Environment variable for overriding the configuration file path
pub const CURFEW_CONFIG_ENV: &str = "CURFEW_CONFIG";

/// System-wide configuration location
const SYSTEM_CONFIG_PATH: &str = "/etc/curfew/config.toml";

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$CURFEW_CONFIG` environment variable (if set)
/// 2. `/etc/curfew/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CURFEW_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the configuration path without checking the `CURFEW_CONFIG` env var.
pub fn config_path_without_env() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_PATH)
}
