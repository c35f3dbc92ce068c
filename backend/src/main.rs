use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use smsdash_backend::app;
use smsdash_backend::config::{AppConfig, StoreKind};
use smsdash_backend::logging::{self, LoggingConfig};
use smsdash_backend::services::job_scheduler_service::JobSchedulerService;
use smsdash_backend::state::AppState;
use smsdash_backend::store::{LedgerBackend, MemoryLedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    logging::init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env().map_err(anyhow::Error::msg)?;
    config.validate().map_err(anyhow::Error::msg)?;

    let backend: Arc<dyn LedgerBackend> = match config.store {
        StoreKind::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store")?;
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .context("Failed to connect to the ledger database")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run ledger migrations")?;
            tracing::info!("Using PostgreSQL ledger store");
            Arc::new(PgLedgerStore::new(pool))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory ledger store; balances are lost on restart");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let state = AppState::new(backend, &config);

    let mut scheduler = if config.job_scheduler_enabled {
        let mut scheduler = JobSchedulerService::new(state.job_context()).await?;
        scheduler.start(&config.reconciliation_schedule).await?;
        Some(scheduler)
    } else {
        tracing::info!("Job scheduler disabled");
        None
    };

    let app = app::create_app(state);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("SMS dashboard ledger running at http://{}/", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.stop().await?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
