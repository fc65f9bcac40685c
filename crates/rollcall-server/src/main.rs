//! Rollcall server - attendance logging from chat page snapshots.

use anyhow::Result;
use clap::Parser;
use rollcall_core::{spawn_periodic_export, spawn_scan_loop, SnapshotWatcher};
use rollcall_server::{app, config::Config, logging, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use logging::{LogConfig, LogFormat};

/// Rollcall server - logs check-ins and check-outs seen in a group chat.
#[derive(Parser, Debug)]
#[command(name = "rollcall-server")]
#[command(about = "Detects check-in/check-out messages in chat snapshots and logs them")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Watch this snapshot file (saved HTML page or JSON tree)
    #[arg(short, long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Keep everything in memory instead of the SQLite database
    #[arg(long)]
    memory: bool,

    /// Enable verbose logging (per-scan summaries)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "scan=debug" or "locator=trace").
    /// Can be specified multiple times. Targets are prefixed with "rollcall::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(snapshot) = cli.snapshot {
        config.snapshot_path = Some(snapshot);
    }

    tracing::info!(target: "rollcall::startup", "Loaded configuration (port: {})", config.port);

    let state = if cli.memory {
        Arc::new(AppState::with_store(config.clone(), Arc::new(rollcall_core::MemoryStore::new()))?)
    } else {
        Arc::new(AppState::new(config.clone())?)
    };
    tracing::info!(
        target: "rollcall::startup",
        source = %state.source.describe(),
        events = state.store.count()?,
        "Initialized application state"
    );

    if let Some(trigger_rx) = state.take_trigger_receiver() {
        spawn_scan_loop(
            state.processor.clone(),
            state.source.clone(),
            trigger_rx,
            config.poll_interval(),
        );
    }

    // Held for the life of the server; dropping it ends the watch.
    let _watcher = match &config.snapshot_path {
        Some(path) => Some(SnapshotWatcher::new(path, state.scheduler.clone()).start()?),
        None => None,
    };

    spawn_periodic_export(
        state.store.clone(),
        config.export_dir.clone(),
        config.auto_export_interval(),
    );

    let app = app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "rollcall::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
