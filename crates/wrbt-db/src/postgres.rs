//! PostgreSQL pool setup for the bot registry.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use wrbt_common::config::DatabaseConfig;

/// Open the registry pool. Acquiring a connection is bounded by the storage
/// timeout so a saturated pool surfaces as a slow storage call, not a hang.
pub async fn connect(url: &str, config: &DatabaseConfig, acquire_timeout: Duration) -> Result<PgPool> {
    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to PostgreSQL..."
    );
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
        .context("connecting to the bot registry database")?;
    tracing::info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Apply the embedded registry migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("running bot registry migrations")?;
    tracing::info!("Migrations complete");
    Ok(())
}

/// True when the registry answers a trivial query.
pub async fn health_check(pool: &PgPool) -> bool {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Bot registry health check failed");
            false
        }
    }
}
