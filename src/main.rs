//! DriveHub Server: scheduled cloud-drive task processor.
//!
//! Main entry point that wires all crates together and runs the scheduler.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use drivehub_core::config::AppConfig;
use drivehub_core::error::AppError;
use drivehub_database::DatabasePool;
use drivehub_database::repositories::connection::ConnectionRepository;
use drivehub_database::repositories::task::TaskRepository;
use drivehub_database::store::{ConnectionStore, TaskStore};
use drivehub_worker::{
    PeriodicTrigger, RunCoordinator, Scheduler, SingleFlight, TaskDispatcher, WorkerPool,
};

#[tokio::main]
async fn main() {
    let env = std::env::var("DRIVEHUB_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!("Loaded configuration (env: {})", env);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
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
    tracing::info!("Starting DriveHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db_pool = DatabasePool::connect(&config.database).await?;

    drivehub_database::migration::run_migrations(db_pool.pool()).await?;

    // ── Step 2: Repositories ─────────────────────────────────────
    let task_store: Arc<dyn TaskStore> = Arc::new(TaskRepository::new(db_pool.pool().clone()));
    let connection_store: Arc<dyn ConnectionStore> =
        Arc::new(ConnectionRepository::new(db_pool.pool().clone()));

    // ── Step 3: Credentials and provider executors ───────────────
    let credentials = Arc::new(drivehub_storage::providers::build_credential_manager(
        &config.providers,
        connection_store,
    )?);
    let mut dispatcher = TaskDispatcher::new(Arc::clone(&task_store));
    for executor in drivehub_storage::providers::build_executors(&config.providers, credentials)? {
        dispatcher.register(executor);
    }

    // ── Step 4: Worker pool, coordinator and scheduler ───────────
    let pool = WorkerPool::new(&config.worker);
    let coordinator = RunCoordinator::new(
        task_store,
        Arc::new(dispatcher),
        pool.clone(),
        config.scheduler.page_size,
    );
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(coordinator),
        Arc::new(SingleFlight::new()),
        &config.scheduler,
    ));

    let mut trigger = if config.scheduler.enabled {
        let trigger = PeriodicTrigger::new(Arc::clone(&scheduler)).await?;
        trigger.start().await?;
        Some(trigger)
    } else {
        tracing::info!("Task processing scheduler disabled");
        None
    };

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await?;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(trigger) = trigger.as_mut() {
        trigger.shutdown().await?;
    }

    tracing::info!("Waiting for in-flight tasks to complete...");
    if !pool.shutdown(config.worker.shutdown_grace()).await {
        tracing::warn!(
            "Worker pool did not drain within {}s; remaining tasks were cancelled",
            config.worker.shutdown_grace_seconds
        );
    }

    db_pool.close().await;
    tracing::info!("DriveHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() -> Result<(), AppError> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| AppError::internal(format!("Failed to install Ctrl+C handler: {}", e)))
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).map_err(
                |e| AppError::internal(format!("Failed to install SIGTERM handler: {}", e)),
            )?;
        signal.recv().await;
        Ok(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<(), AppError>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}
