//! Configuration parsing and validation for curfew
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Managed account definitions with fallback secrets
//! - Command channel credentials, operator allow-list and reconnect tuning
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Values supplied outside the config file (CLI flags, environment)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bot_token: Option<String>,
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    load_config_with(path, &ConfigOverrides::default())
}

/// Load configuration, applying overrides before validation
pub fn load_config_with(
    path: impl AsRef<Path>,
    overrides: &ConfigOverrides,
) -> ConfigResult<Policy> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    warn_if_exposed(path);
    parse_config_with(&content, overrides)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    parse_config_with(content, &ConfigOverrides::default())
}

pub fn parse_config_with(content: &str, overrides: &ConfigOverrides) -> ConfigResult<Policy> {
    let mut raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    if let Some(token) = &overrides.bot_token {
        raw.channel.bot_token = token.clone();
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// The file holds the bot token and fallback secrets.
#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode & 0o777),
                "Config file is readable by other users; restrict it to 0600"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        config_version = 1

        [channel]
        bot_token = "123:abc"
        authorized_operators = [42]

        [[accounts]]
        id = "kid1"
        display_name = "Alice"
        fallback_secret = "locked"
    "#;

    #[test]
    fn parse_minimal_config() {
        let policy = parse_config(MINIMAL).unwrap();
        assert_eq!(policy.accounts.len(), 1);
        assert_eq!(policy.accounts[0].id.as_str(), "kid1");
    }

    #[test]
    fn reject_wrong_version() {
        let config = MINIMAL.replace("config_version = 1", "config_version = 99");
        let result = parse_config(&config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn token_override_satisfies_validation() {
        let config = MINIMAL.replace("bot_token = \"123:abc\"", "");
        assert!(matches!(
            parse_config(&config),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let overrides = ConfigOverrides {
            bot_token: Some("999:env".into()),
        };
        let policy = parse_config_with(&config, &overrides).unwrap();
        assert_eq!(policy.channel.bot_token.expose(), "999:env");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.channel.authorized_operators.len(), 1);
    }

    #[test]
    fn load_missing_file() {
        let result = load_config("/nonexistent/curfew.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
