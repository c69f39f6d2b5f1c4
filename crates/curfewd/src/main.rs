//! curfewd - The curfew background service
//!
//! This is the main entry point for the curfewd service.
//! It wires together all the components:
//! - Configuration loading
//! - Session registry and expiry sweeper
//! - Shutdown scheduler
//! - Host backend (Linux)
//! - Command channel, dispatcher and operator notifications

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use curfew_bot::{Dispatcher, Notifier};
use curfew_channel::{CommandChannel, TelegramTransport};
use curfew_config::{ConfigOverrides, Policy, load_config_with};
use curfew_core::{CoreEvent, ExpirySweeper, SessionRegistry, ShutdownScheduler};
use curfew_host_linux::{LinuxSessionBackend, LinuxShutdown};
use curfew_util::default_config_path;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// curfewd - Timed login access granted from a chat bot
#[derive(Parser, Debug)]
#[command(name = "curfewd")]
#[command(about = "Timed login access for managed accounts, granted from a chat bot", long_about = None)]
struct Args {
    /// Configuration file path (or set CURFEW_CONFIG env var)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Bot token override (or set CURFEW_BOT_TOKEN env var)
    #[arg(long, env = "CURFEW_BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

/// Main service state
struct Service {
    policy: Policy,
    registry: Arc<SessionRegistry>,
    events: mpsc::UnboundedReceiver<CoreEvent>,
    scheduler: Arc<ShutdownScheduler>,
    transport: Arc<TelegramTransport>,
}

fn load_policy(args: &Args) -> Result<Policy> {
    let overrides = ConfigOverrides {
        bot_token: args.bot_token.clone(),
    };
    let policy = load_config_with(&args.config, &overrides)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        accounts = policy.accounts.len(),
        operators = policy.channel.authorized_operators.len(),
        "Configuration loaded"
    );
    Ok(policy)
}

impl Service {
    async fn new(policy: Policy) -> Result<Self> {
        let command_timeout = policy.service.host_command_timeout;
        let backend = Arc::new(LinuxSessionBackend::new(command_timeout));
        // Leave room for the slowest backend call: the JSON listing plus its fallback
        let (registry, events) = SessionRegistry::with_host_timeout(
            backend,
            policy.accounts.clone(),
            command_timeout * 2,
        );

        // A restart forgets every grant, so no temporary secret may survive it
        let report = registry.restore_all_secrets().await;
        for (account, message) in &report.failed {
            warn!(account = %account, error = %message, "Account may still hold a temporary secret");
        }

        let scheduler = Arc::new(ShutdownScheduler::new(Arc::new(LinuxShutdown::new(
            command_timeout,
        ))));

        let transport = Arc::new(
            TelegramTransport::new(&policy.channel)
                .context("Failed to build command channel HTTP client")?,
        );

        Ok(Self {
            policy,
            registry,
            events,
            scheduler,
            transport,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            policy,
            registry,
            events,
            scheduler,
            transport,
        } = self;

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let channel = CommandChannel::from_config(transport.clone(), &policy.channel);
        let notifier = Notifier::new(
            transport,
            policy.channel.authorized_operators.clone(),
            channel.state(),
        );
        let mut dispatcher = Dispatcher::new(registry.clone(), scheduler, &policy);
        let sweeper = ExpirySweeper::new(registry.clone(), policy.service.sweep_interval);

        let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));
        let notifier_task = tokio::spawn(notifier.run(events, shutdown_rx.clone()));
        let channel_rx = shutdown_rx.clone();
        let channel_task = tokio::spawn(async move {
            channel.run(&mut dispatcher, channel_rx).await;
        });

        info!("Service running");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, shutting down gracefully");
            }
        }

        // Graceful shutdown
        info!("Shutting down curfewd");
        shutdown_tx.send_replace(true);

        for (name, task) in [
            ("channel", channel_task),
            ("sweeper", sweeper_task),
            ("notifier", notifier_task),
        ] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Task ended abnormally");
            }
        }

        if policy.service.revoke_on_exit {
            let report = registry.lock_all().await;
            if report.is_clean() {
                info!(
                    grants = report.grants_cleared,
                    sessions = report.sessions_closed,
                    "Revoked all access on exit"
                );
            } else {
                warn!(
                    grants = report.grants_cleared,
                    failures = ?report.failures,
                    "Revoking access on exit was incomplete"
                );
            }
        } else {
            let dropped = registry.discard_all().await;
            info!(grants = dropped, "Grants left in place on exit");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "curfewd starting");

    let policy = load_policy(&args)?;

    if args.check {
        println!("✓ Configuration is valid");
        println!("  Accounts: {}", policy.accounts.len());
        for account in &policy.accounts {
            println!("    - {} ({})", account.id, account.display_name);
        }
        println!("  Operators: {}", policy.channel.authorized_operators.len());
        return Ok(());
    }

    let service = Service::new(policy).await?;
    service.run().await
}
