use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;

use service_core::error::AppError;
use service_core::observability::logging::init_tracing;

use verification_service::config::{StorageBackend, VerificationConfig};
use verification_service::services::{cleanup, JwtService, TestResultServerClient};
use verification_service::storage::memory::{InMemorySessionStore, InMemoryTanStore};
use verification_service::storage::postgres::{ensure_schema, PgSessionStore, PgTanStore};
use verification_service::storage::{SessionStore, TanStore};
use verification_service::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = VerificationConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        profile = ?config.profile,
        "Starting verification service"
    );

    // Initialize storage
    let (sessions, tans): (Arc<dyn SessionStore>, Arc<dyn TanStore>) =
        match config.storage.backend {
            StorageBackend::Postgres => {
                let url = config.storage.database_url.as_deref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is not set"))
                })?;
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
                ensure_schema(&pool)
                    .await
                    .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
                tracing::info!("Connected to PostgreSQL");
                (
                    Arc::new(PgSessionStore::new(pool.clone())),
                    Arc::new(PgTanStore::new(pool)),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory storage backend; data is lost on restart");
                (
                    Arc::new(InMemorySessionStore::new()),
                    Arc::new(InMemoryTanStore::new()),
                )
            }
        };

    // Initialize collaborators
    let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
    let result_client = Arc::new(
        TestResultServerClient::new(&config.result_server.base_url)
            .map_err(AppError::ConfigError)?,
    );
    tracing::info!(url = %config.result_server.base_url, "Result server client initialized");

    let state = AppState::new(config.clone(), sessions.clone(), tans.clone(), result_client, jwt);

    // Start the retention job
    let cleanup_handle = cleanup::start_cleanup_task(sessions, tans, config.cleanup.clone());

    // Build application router
    let app = build_router(state).await?;

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cleanup_handle.abort();
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // Give outstanding delayed completions a moment to fire
    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
}
