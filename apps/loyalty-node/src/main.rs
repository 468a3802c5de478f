//! # Loyalty Ledger Node
//!
//! Owns the ledger database and runs the accrual reconciler in the
//! background until asked to stop.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load config ──► init tracing ──► open database (migrations)           │
//! │                                        │                                │
//! │                                        ▼                                │
//! │  Ctrl-C / SIGTERM ◄── reconciler ticking every poll interval           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  cancel tasks ──► wait for in-flight tick ──► close pool               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! loyalty-node [--config <path>]
//! ```
//! `LOYALTY_CONFIG` names the config file when `--config` is absent.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loyalty_accrual::{AccrualClient, BackgroundTasks, Reconciler, ServiceConfig};
use loyalty_db::{Database, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(config_path(std::env::args().skip(1)))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.log_level))
        .with_target(true)
        .init();

    info!("Starting loyalty ledger node...");
    info!(
        accrual = %config.accrual_address,
        poll_interval_secs = config.poll_interval_secs,
        failure_policy = %config.failure_policy,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("Failed to open ledger database")?;
    if !db.health_check().await {
        anyhow::bail!("Ledger database failed its health check");
    }
    let ledger = Ledger::new(db);
    info!("Ledger database ready");

    let client = AccrualClient::new(&config.accrual_address, config.operation_timeout())
        .context("Failed to build accrual client")?;
    info!(base = %client.base(), "Accrual client ready");

    let mut tasks = BackgroundTasks::new();
    Reconciler::new(ledger.clone(), Arc::new(client), config.failure_policy)
        .run_every(&mut tasks, config.poll_interval());

    shutdown_signal().await;

    tasks.shutdown().await;
    ledger.database().close().await;

    info!("Node shutdown complete");
    Ok(())
}

const DEFAULT_LOG_LEVEL: &str = "info";

/// Loads the config under a temporary subscriber at the default level, so
/// override warnings show up before the configured level is known.
fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServiceConfig> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_LOG_LEVEL))
        .with_target(true)
        .finish();

    tracing::subscriber::with_default(bootstrap, || ServiceConfig::load(path))
        .context("Failed to load configuration")
}

/// RUST_LOG wins over `level`.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Picks the config file from `--config <path>`, `--config=<path>`, or
/// `LOYALTY_CONFIG`.
fn config_path(mut args: impl Iterator<Item = String>) -> Option<PathBuf> {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }

    std::env::var_os("LOYALTY_CONFIG").map(PathBuf::from)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
