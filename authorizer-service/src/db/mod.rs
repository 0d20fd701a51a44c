//! PostgreSQL pool and schema migrations for the authorization store.

use crate::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Connect the pool. `acquire_timeout` bounds how long a store call may wait
/// for a free connection.
pub async fn create_pool(
    config: &DatabaseConfig,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        max_connections = config.max_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(acquire_timeout)
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await?;

    tracing::info!("Successfully connected to PostgreSQL");

    Ok(pool)
}

/// Apply the embedded migrations when enabled.
pub async fn migrate(pool: &PgPool, config: &DatabaseConfig) -> Result<(), sqlx::migrate::MigrateError> {
    if !config.run_migrations {
        tracing::info!("Skipping database migrations (DATABASE_RUN_MIGRATIONS=false)");
        return Ok(());
    }

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}
