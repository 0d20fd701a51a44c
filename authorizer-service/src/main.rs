use anyhow::Context;
use authorizer_service::{
    build_router,
    config::AuthorizerConfig,
    db,
    services::{PgAuthorizationStore, RedisSessionStore, SigningKeys},
    utils::Argon2Credentials,
    AppState,
};
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration - fail fast if invalid
    let config = AuthorizerConfig::from_env().context("Failed to load configuration")?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    authorizer_service::services::metrics::init_metrics()
        .context("Failed to register metrics")?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authorizer service"
    );

    tracing::info!("Initializing database connections");
    let pool = db::create_pool(&config.database, config.store.operation_timeout())
        .await
        .context("Failed to connect to PostgreSQL")?;
    db::migrate(&pool, &config.database)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database initialized successfully");

    let sessions = RedisSessionStore::new(&config.redis).await?;
    tracing::info!("Redis session store initialized");

    let keys = SigningKeys::load(&config.jwt)?;
    tracing::info!(kid = %keys.kid(), "Signing key loaded");

    let state = AppState::new(
        config.clone(),
        Arc::new(PgAuthorizationStore::new(pool)),
        Arc::new(sessions),
        Arc::new(Argon2Credentials),
        keys,
    );

    let app = build_router(state).await?;

    let addr = config.common.socket_addr()?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

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
}
