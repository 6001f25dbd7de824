//! Stegorelay - Pluggable Transport Relay
//!
//! This is the main entry point for the Stegorelay application. It is meant
//! to be launched by a PT host, which talks to it over environment variables
//! and stdout; all logging therefore goes to stderr.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use stegorelay::config::{load_config, Config};
use stegorelay::controller::{run, signal::termination_requested};
use stegorelay::pt::{exit_on_stdin_close, ProcessEnv, Role};
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Stegorelay - relay between a PT host and a steganographic obfuscation engine
#[derive(Parser, Debug)]
#[command(name = "stegorelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Which side of the transport to run
    #[arg(short, long, value_enum)]
    role: Role,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };

    info!("Stegorelay v{} ({} role)", stegorelay::VERSION, args.role);

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let terminated = termination_requested(exit_on_stdin_close(&ProcessEnv));
    tokio::spawn(async move {
        terminated.await;
        let _ = shutdown_tx.send(true);
    });

    run(config, args.role, shutdown_rx).await
}

/// Setup logging based on configuration
///
/// Stdout belongs to the PT protocol, so every subscriber writes to stderr.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
