//! # Fix Relay
//!
//! Forward location fixes to a remote collector over HTTP or a persistent
//! TCP stream.
//!
//! The binary reads fixes as JSON lines from stdin and runs them through the
//! relay pipeline configured in a TOML file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use fix_relay::config::{Config, LoggingConfig};
use fix_relay::fix::lines::forward_lines;
use fix_relay::fix::raw_fix_channel;
use fix_relay::pipeline::Pipeline;
use fix_relay::transport::{build_transport, LogStatusSink};

/// Default configuration file location
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// How often to check for a drained queue after end of input
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "fix-relay", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FIX_RELAY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Main entry point for Fix Relay
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (defaults if the default file is absent)
///    - Set up logging to stderr and optionally a daily log file
///    - Build the configured transport and start the pipeline
///
/// 2. **Main Loop**
///    - Forward JSON lines from stdin to the pipeline
///    - On end of input, wait until every fix is settled
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the workers, close the transport, log the totals
///
/// # Errors
///
/// Returns error if the configuration is invalid or the transport cannot be
/// built.
///
/// # Examples
///
/// ```bash
/// echo '{"latitude":40.7128,"longitude":-74.006}' | fix-relay --config relay.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, from_file) = load_config(&args.config)?;
    let _guard = init_logging(&config.logging);

    info!("Fix Relay v{} starting...", env!("CARGO_PKG_VERSION"));
    if !from_file {
        warn!("No configuration at {}, using defaults", args.config.display());
    }

    let transport = build_transport(&config, Arc::new(LogStatusSink)).context("Failed to build transport")?;
    let (tx, rx) = raw_fix_channel();
    let pipeline = Pipeline::builder(transport, rx).with_config(&config).start().await;

    let shutdown = pipeline.shutdown_token();
    let mut input = tokio::spawn(forward_lines(BufReader::new(tokio::io::stdin()), tx, shutdown));

    info!("Reading fixes from stdin, press Ctrl+C to exit");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = &mut input => {
            match result {
                Ok(count) => info!("Input finished ({} fixes read), waiting for delivery", count),
                Err(e) => warn!("Input task failed: {}", e),
            }

            let mut poll = interval(DRAIN_POLL_INTERVAL);
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                _ = async {
                    loop {
                        poll.tick().await;
                        if pipeline.queue_len() == 0 && pipeline.stats().pending() == 0 {
                            break;
                        }
                    }
                } => {
                    info!("All fixes settled, shutting down...");
                }
            }
        }
    }

    let totals = pipeline.shutdown().await;
    input.abort();
    info!("Total fixes delivered: {}", totals.sent);

    Ok(())
}

/// Load the configuration file
///
/// A missing file at the default location falls back to defaults; any other
/// missing or invalid file is an error. Returns whether a file was read.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        return Ok((Config::default(), false));
    }

    let config = Config::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok((config, true))
}

/// Initialize tracing
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes
/// the log file and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = if config.directory.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&config.directory, "fix-relay.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
