//! # Preventa Agent
//!
//! Headless process around the Sync Engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          preventa-agent                                 │
//! │                                                                         │
//! │  status   ──► open Local Store ──► print SyncOverview                  │
//! │  sync     ──► AppContext ──► SyncEngine::full_sync ──► print report    │
//! │  daemon   ──► AppContext ──► SyncAgent (interval + initial trigger)    │
//! │                                 └── runs until Ctrl-C / SIGTERM        │
//! │                                                                         │
//! │  --dry-run: scratch copy of the store + MemoryRemote                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Startup Sequence
//! 1. Initialize tracing (`RUST_LOG` overrides the default filter)
//! 2. Load `SyncConfig` (file, then environment)
//! 3. Build the [`AppContext`] for the chosen remote
//! 4. Run the command, then shut the context down

mod context;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use preventa_sync::{
    RemoteBackend, SyncConfig, SyncEventEmitter, SyncReport, SyncStatus,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::context::{open_database, AppContext};

#[derive(Parser)]
#[command(name = "preventa-agent", version, about = "Preventa offline sync agent")]
struct Cli {
    /// Path to sync.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides config and PREVENTA_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Sync a scratch copy of the store against an in-memory backend
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run one full sync and print the report
    Sync,
    /// Print local record counts and pending uploads
    Status,
    /// Run the background sync agent until interrupted
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.clone()).context("loading sync config")?;

    info!(
        device_id = %config.device_id(),
        user_id = config.user_id().unwrap_or("-"),
        mode = %config.mode(),
        "Preventa agent starting"
    );

    if let Command::Status = cli.command {
        return status(&cli, &config).await;
    }

    if cli.dry_run {
        let ctx = AppContext::dry_run(config, cli.db.clone()).await?;
        run(ctx, &cli).await
    } else {
        let ctx = AppContext::init(config, cli.db.clone()).await?;
        if !ctx.wait_connected().await {
            warn!("Backend not reachable yet");
        }
        run(ctx, &cli).await
    }
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=preventa_sync=trace` - Trace the sync crate only
/// - Default: `info,preventa=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,preventa=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn run<R: RemoteBackend + 'static>(mut ctx: AppContext<R>, cli: &Cli) -> Result<()> {
    let outcome = match cli.command {
        Command::Sync => {
            let report = ctx.engine.full_sync().await;
            print_report(&report, cli.json)
        }
        Command::Daemon => {
            let handle = ctx.start_agent(Arc::new(LogEmitter));
            handle.trigger();
            shutdown_signal().await;
            Ok(())
        }
        Command::Status => Ok(()),
    };

    ctx.shutdown().await;
    outcome
}

async fn status(cli: &Cli, config: &SyncConfig) -> Result<()> {
    let db = open_database(config, cli.db.clone()).await?;
    let overview = db.sync_state().overview().await;
    db.close().await;
    let overview = overview.context("reading sync overview")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!("clients          {}", overview.clients);
    println!("products         {}", overview.products);
    println!("orders           {} ({} pending)", overview.orders, overview.pending_orders);
    println!("collections      {} ({} pending)", overview.collections, overview.pending_collections);
    println!("route changes    {} pending", overview.pending_route_items);
    println!("reconciliations  {} pending", overview.pending_reconciliations);
    match overview.last_sync {
        Some(at) => println!("last sync        {}", at.to_rfc3339()),
        None => println!("last sync        never"),
    }
    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.summary());
        for message in &report.errors {
            println!("  error: {message}");
        }
        for failure in &report.failures {
            println!("  {} {}: {}", failure.kind, failure.id, failure.message);
        }
    }

    if report.success {
        Ok(())
    } else {
        anyhow::bail!("sync did not complete cleanly")
    }
}

/// Waits for Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
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

/// Reports agent events to the log.
struct LogEmitter;

impl SyncEventEmitter for LogEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        info!(
            state = %status.state,
            pending = status.pending_count,
            last_sync = ?status.last_sync,
            "Sync status"
        );
    }

    fn emit_progress(&self, pending: u64, uploaded: usize) {
        info!(pending, uploaded, "Sync progress");
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        warn!(message, retryable, "Sync error");
    }
}
