//! Config validation CLI tool
//!
//! Validates a curfew configuration file and reports any errors.

use curfew_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a curfew configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match curfew_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", curfew_config::CURRENT_CONFIG_VERSION);
            println!("  Operators: {}", policy.channel.authorized_operators.len());
            println!("  Accounts: {}", policy.accounts.len());
            println!(
                "  Sweep interval: {}s",
                policy.service.sweep_interval.as_secs()
            );
            println!(
                "  Host command timeout: {}s",
                policy.service.host_command_timeout.as_secs()
            );
            let reconnect = policy.channel.reconnect_interval.as_secs();
            match policy.channel.max_reconnect_attempts {
                Some(n) => println!("  Reconnect: every {reconnect}s, warn after {n} attempts"),
                None => println!("  Reconnect: every {reconnect}s, unlimited"),
            }

            println!();
            println!("Accounts:");
            for account in &policy.accounts {
                println!("  - {}: {}", account.id, account.display_name);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                curfew_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                curfew_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                curfew_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                curfew_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        curfew_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
