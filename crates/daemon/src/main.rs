//! Tunekeeper Daemon - Main Entry Point
//! JSON-RPC server + built-in poll timer over one SQLite database

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use config::DaemonConfig;
use tunekeeper_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use tunekeeper_core::application::{
    shutdown_channel, JobSubmitter, LockManager, PollScheduler, RetryOrchestrator,
    SnapshotBuilder, StatusPoller,
};
use tunekeeper_core::port::id_provider::UuidProvider;
use tunekeeper_core::port::time_provider::SystemTimeProvider;
use tunekeeper_core::port::{
    IdProvider, JobEventRepository, LockRepository, Notifier, SnapshotRepository, TimeProvider,
    TrainingDataSource, TrainingProvider, TransactionalSnapshotRepository,
};
use tunekeeper_infra_http::{
    build_client, HttpDataSource, LogNotifier, OpenAiTrainingProvider, WebhookNotifier,
};
use tunekeeper_infra_sqlite::{
    create_pool, run_migrations, SqliteJobEventRepository, SqliteLockRepository,
    SqliteSnapshotRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tunekeeper-daemon")]
#[command(about = "Fine-tune job lifecycle daemon", version)]
struct Args {
    /// TOML config file (env vars still override it)
    #[arg(short, long, env = "TUNEKEEPER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let cfg = DaemonConfig::load(args.config.as_deref())?;

    // 2. Initialize logging
    let _log_guard = logging::init(cfg.log_format, cfg.log_dir.as_deref())?;

    info!("Tunekeeper v{} starting...", VERSION);

    // 3. Initialize database
    if let Some(dir) = cfg.database_dir() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    info!(db_path = %cfg.database_path, "Initializing database...");

    let pool = create_pool(&cfg.database_url())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);

    let sqlite_snapshots = Arc::new(SqliteSnapshotRepository::new(pool.clone()));
    let snapshot_repo: Arc<dyn SnapshotRepository> = sqlite_snapshots.clone();
    let tx_snapshot_repo: Arc<dyn TransactionalSnapshotRepository> = sqlite_snapshots;
    let lock_repo: Arc<dyn LockRepository> = Arc::new(SqliteLockRepository::new(pool.clone()));
    let event_repo: Arc<dyn JobEventRepository> =
        Arc::new(SqliteJobEventRepository::new(pool.clone()));

    let http = build_client(Duration::from_secs(cfg.provider.timeout_secs))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if cfg.provider.api_key.is_none() {
        warn!("provider.api_key is not set; provider calls will be rejected");
    }
    let provider: Arc<dyn TrainingProvider> = Arc::new(OpenAiTrainingProvider::new(
        http.clone(),
        cfg.provider.base_url.clone(),
        cfg.provider.api_key.clone().unwrap_or_default(),
    ));
    let data_source: Arc<dyn TrainingDataSource> = Arc::new(HttpDataSource::new(
        http.clone(),
        cfg.exporter.base_url.clone(),
        cfg.exporter.api_key.clone(),
    ));
    let notifier: Arc<dyn Notifier> = match &cfg.notifier.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(http.clone(), url.clone())),
        None => {
            info!("No notifier.webhook_url configured; notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let settings = cfg.lifecycle.clone();

    let lock_manager = Arc::new(LockManager::new(
        lock_repo,
        id_provider.clone(),
        time_provider.clone(),
        settings.lock_ttl_ms,
    ));
    let submitter = Arc::new(JobSubmitter::new(
        snapshot_repo.clone(),
        event_repo.clone(),
        provider.clone(),
        time_provider.clone(),
        settings.clone(),
    ));
    let builder = Arc::new(SnapshotBuilder::new(
        tx_snapshot_repo,
        data_source.clone(),
        lock_manager.clone(),
        submitter.clone(),
        id_provider,
        time_provider.clone(),
        settings.clone(),
    ));
    let retry = Arc::new(RetryOrchestrator::new(
        snapshot_repo.clone(),
        event_repo.clone(),
        lock_manager.clone(),
        data_source,
        submitter,
        time_provider.clone(),
        settings.clone(),
    ));
    let poller = Arc::new(StatusPoller::new(
        snapshot_repo.clone(),
        event_repo.clone(),
        provider,
        notifier,
        retry.clone(),
        time_provider,
        settings,
    ));

    // 5. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let handler = Arc::new(RpcHandler::new(
        builder,
        retry,
        lock_manager,
        poller.clone(),
        snapshot_repo,
        event_repo,
    ));
    let rpc_config = RpcServerConfig {
        host: cfg.rpc.host.clone(),
        port: cfg.rpc.port,
    };
    let (rpc_handle, addr) = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;
    info!(%addr, "JSON-RPC server listening");

    // 6. Start poll timer
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let poll_handle = if cfg.poller.interval_secs > 0 {
        let scheduler = PollScheduler::new(poller, Duration::from_secs(cfg.poller.interval_secs));
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        info!("Built-in poll timer disabled; call poller.run.v1 to reconcile jobs");
        None
    };

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    if let Some(handle) = poll_handle {
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
            warn!("Poll pass still running at shutdown, abandoning it");
        }
    }
    pool.close().await;

    info!("Shutdown complete.");

    Ok(())
}
