//! Bill Ledger - API Server Binary
//!
//! This binary starts the HTTP API server for the bill ledger.
//!
//! # Usage
//!
//! ```bash
//! # Run against PostgreSQL
//! API_DATABASE_URL=postgres://... cargo run --bin billing-api
//!
//! # Run with the in-memory store
//! API_LEDGER_BACKEND=memory cargo run --bin billing-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_LEDGER_BACKEND` - `postgres` or `memory` (default: postgres)
//! * `API_MAILBOX_CAPACITY` - Queued commands per bill (default: 64)
//! * `API_COMMAND_TIMEOUT_MS` - Wait for an orchestrator reply (default: 10000)
//! * `API_RETRY_MAX_RETRIES`, `API_RETRY_INITIAL_DELAY_MS`, `API_RETRY_MAX_DELAY_MS` -
//!   Store retry backoff

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::{BillingService, InMemoryLedgerStore, LedgerStore};
use infra_db::{create_pool, run_migrations, PostgresLedgerStore};
use interface_api::config::{ApiConfig, LedgerBackend};
use interface_api::create_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API_* configuration")?;

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        backend = ?config.ledger_backend,
        "Starting bill ledger API server"
    );

    let store = build_store(&config).await?;
    let service = Arc::new(BillingService::new(store, config.billing()));

    let recovered = service
        .recover()
        .await
        .context("failed to recover open bills")?;
    tracing::info!(recovered, "Open bills recovered");

    let app = create_router(service);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid server address {}", config.server_addr()))?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn build_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.ledger_backend {
        LedgerBackend::Memory => {
            tracing::warn!("Using in-memory ledger store; bills are lost on restart");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
        LedgerBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(config.database())
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("failed to apply migrations")?;
            Ok(Arc::new(PostgresLedgerStore::new(pool)))
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
