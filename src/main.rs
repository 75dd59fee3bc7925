//! Tablewatch Monitor
//!
//! Run with: cargo run -- <db_name> <dir_path> <monitor_name> [--config tablewatch.toml]
//!
//! Environment variables:
//! - TABLEWATCH_CONFIG: Path of the TOML wiring file
//! - TABLEWATCH_DB_ROOT: Directory holding the databases (default: .)
//! - TABLEWATCH_INTERVAL_SECS: Override the polling interval
//! - RUST_LOG: Log level (default: info)
//!
//! Reports are mailed through an HTTP mail relay declared as a `Webhook`
//! target under `[mail]` in the config file. Without one they only reach the log.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tablewatch::db::{PoolConfig, SqliteConnector};
use tablewatch::monitor::{Monitor, MonitorConfig, Notifier};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Database table monitor
#[derive(Debug, Parser)]
#[command(name = "tablewatch", version, about)]
struct Cli {
    /// Name of the database, like DBName
    db_name: String,

    /// Project directory that file columns are resolved against, like /data/MyProject
    dir_path: String,

    /// Name of this monitor, used in report subjects
    monitor_name: String,

    /// TOML file declaring listeners and mail targets
    #[arg(long, env = "TABLEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the database files
    #[arg(long, env = "TABLEWATCH_DB_ROOT", default_value = ".")]
    db_root: PathBuf,

    /// Seconds to sleep after each pass
    #[arg(long, env = "TABLEWATCH_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablewatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(secs) = cli.interval_secs {
        config = config.with_interval(Duration::from_secs(secs.max(1)));
    }

    let db_path = cli.db_root.join(&cli.db_name);
    let connector = SqliteConnector::new(&db_path, PoolConfig::default());
    let notifier = Notifier::new(cli.monitor_name.clone(), config.mail.clone());
    let mut monitor = Monitor::new(connector, notifier).with_interval(config.interval);
    for listener in config.build_listeners(&cli.dir_path)? {
        monitor.add_listener(listener);
    }

    tracing::info!("Tablewatch configuration:");
    tracing::info!("  Monitor: {}", cli.monitor_name);
    tracing::info!("  Database: {}", db_path.display());
    tracing::info!("  Project dir: {}", cli.dir_path);
    tracing::info!("  Interval: {} seconds", config.interval.as_secs());
    tracing::info!(
        "  Link failure threshold: {} seconds",
        config.link_failure_threshold.as_secs()
    );
    for listener in monitor.listeners() {
        tracing::info!("    - {} on '{}'", listener.name(), listener.table());
    }
    if !config.mail.delivers_externally() {
        tracing::warn!("No Webhook mail relay configured; reports are only logged");
    }
    if monitor.listeners().is_empty() {
        tracing::warn!("No listeners configured; pass --config to declare some");
    }

    if cli.once {
        monitor.run_pass().await;
        return Ok(());
    }

    monitor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
