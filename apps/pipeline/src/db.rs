use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Connections kept for HTTP handlers on top of one per queue worker.
const HANDLER_CONNECTIONS: u32 = 4;

/// Creates the PostgreSQL pool backing the application store.
/// Sized so every queue worker can hold a connection while handlers still get one.
pub async fn create_pool(database_url: &str, worker_concurrency: usize) -> Result<PgPool> {
    let max_connections = u32::try_from(worker_concurrency)
        .unwrap_or(u32::MAX)
        .saturating_add(HANDLER_CONNECTIONS);
    info!("Connecting to PostgreSQL (max {max_connections} connections)...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}
