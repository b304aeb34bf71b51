//! Kuba Logmon
//!
//! Follows an HTTP access log, prints a traffic summary every stats
//! interval and raises threshold alerts on request rates.
//!
//! # CLI Commands
//!
//! - `start` - Monitor the configured log file (default if no command specified)
//! - `check-config` - Validate configuration and print the effective settings
//! - `generate` - Write synthetic access-log lines
//!
//! # Configuration
//!
//! The monitor reads configuration from:
//! 1. `--config <path>`
//! 2. `./logmon.toml` in current directory
//! 3. Default configuration
//!
//! `LOGMON_LOG_FILE`, `LOGMON_STATS_INTERVAL_SECS` and `RUST_LOG` override
//! the file; command-line flags override both.

mod generator;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kuba_logmon::{
    config::Config,
    engine::MemoryStore,
    ingestion::FileTailer,
    metrics, EventSink, Monitor, MonitorEvent,
};
use tokio::signal;
use tracing::{debug, info, warn};

const DEFAULT_CONFIG_FILE: &str = "logmon.toml";

// =============================================================================
// CLI Definition
// =============================================================================

/// Kuba Logmon - HTTP access-log monitor
#[derive(Parser)]
#[command(name = "kuba-logmon")]
#[command(version)]
#[command(about = "HTTP access-log monitor with traffic summaries and threshold alerts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the access log to follow
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,

    /// Override the stats interval in seconds
    #[arg(short, long, global = true)]
    stats_interval: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the access log (default)
    Start,

    /// Validate configuration without starting the monitor
    CheckConfig,

    /// Write synthetic access-log lines
    Generate {
        /// Append to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Milliseconds between lines
        #[arg(short, long, default_value_t = 100)]
        interval_ms: u64,

        /// Stop after this many lines
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
}

// =============================================================================
// Event Output
// =============================================================================

/// Prints summaries and alert notifications to stdout
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: MonitorEvent) {
        println!("{}", event);
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Load configuration: explicit file, then `./logmon.toml`, then defaults
fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file_with_env(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::from_file_with_env(DEFAULT_CONFIG_FILE)?
        },
        None => Config::from_env()?,
    };

    if let Some(log_file) = &cli.log_file {
        config.source.log_file = log_file.clone();
    }
    if let Some(secs) = cli.stats_interval {
        config.reporting.stats_interval_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler installation failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler installation failed");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Validate configuration and print it
fn cmd_check_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;

    println!("Configuration is valid!");
    println!();
    println!("{}", config.to_toml()?);

    Ok(())
}

async fn cmd_generate(
    output: Option<&Path>,
    interval_ms: u64,
    count: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("warn");

    if interval_ms == 0 {
        return Err("--interval-ms must be > 0".into());
    }

    let written = generator::run(output, Duration::from_millis(interval_ms), count).await?;
    debug!(lines = written, "Generator finished");
    Ok(())
}

async fn cmd_start(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    init_tracing(&config.logging.level);

    info!("Starting Kuba Logmon v{}", env!("CARGO_PKG_VERSION"));
    debug!(
        log_file = %config.source.log_file.display(),
        stats_interval_secs = config.reporting.stats_interval_secs,
        alerts = config.alerts.len(),
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::with_config(config.store_config()));
    let source = FileTailer::with_config(&config.source.log_file, config.tailer_config());

    let monitor = Monitor::new(
        config.monitor_config(),
        store,
        Box::new(source),
        Arc::new(ConsoleSink),
    )?;
    monitor.start()?;

    tokio::select! {
        _ = shutdown_signal() => {},
        error = monitor.wait_for_failure() => {
            warn!(error = %error, "Stopping after service failure");
        },
    }

    let result = monitor.stop().await;
    info!(metrics = %metrics::summary(), "Monitor shut down");

    result.map_err(Into::into)
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => cmd_check_config(&cli),
        Some(Commands::Generate {
            output,
            interval_ms,
            count,
        }) => cmd_generate(output.as_deref(), *interval_ms, *count).await,
        Some(Commands::Start) | None => cmd_start(&cli).await,
    }
}
