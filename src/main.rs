//! Helpdesk Server: background job engine
//!
//! Main entry point that wires the lock store, execution history, and
//! scheduler together and runs until a shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use helpdesk_cache::CacheManager;
use helpdesk_core::config::{AppConfig, LogFormat};
use helpdesk_core::error::AppError;
use helpdesk_database::DatabasePool;
use helpdesk_worker::jobs::ExecutionRetentionJob;
use helpdesk_worker::{InstanceId, LockManager, Scheduler};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from `config/default.toml`, the environment overlay,
/// and `HELPDESK__*` variables
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("HELPDESK_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Helpdesk job engine v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Execution history ──────────────────────────────────
    let db = DatabasePool::connect(&config.database).await?;
    let store = db.execution_store();

    // ── Step 2: Lock store ─────────────────────────────────────────
    let cache = CacheManager::new(&config.cache).await?;
    let instance_id = InstanceId::from_config(config.scheduler.instance_id.as_deref());
    let locks = LockManager::new(cache.provider(), instance_id)
        .with_ttl(config.scheduler.lock_ttl());
    tracing::info!(
        instance_id = %locks.instance_id(),
        provider = %config.cache.provider,
        lock_ttl_secs = locks.ttl().as_secs(),
        "Lock manager ready"
    );

    if !config.scheduler.enabled {
        tracing::info!("Scheduler disabled by configuration; idling until shutdown");
        shutdown_signal().await;
        db.close().await;
        return Ok(());
    }

    // ── Step 3: Scheduler and built-in jobs ────────────────────────
    let scheduler = Scheduler::new(Arc::new(locks), store.clone()).await?;
    scheduler
        .register_job(ExecutionRetentionJob::definition(
            store,
            &config.scheduler.retention,
        ))
        .await?;
    scheduler.start().await?;

    let job_names: Vec<String> = scheduler
        .get_jobs()
        .await
        .into_iter()
        .map(|job| job.name)
        .collect();
    tracing::info!(jobs = ?job_names, "Scheduler running");

    // ── Step 4: Wait for shutdown ──────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping scheduler...");

    if let Err(e) = scheduler.stop().await {
        tracing::error!("Failed to stop scheduler cleanly: {}", e);
    }
    db.close().await;

    tracing::info!("Helpdesk job engine stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
}
