//! Connection pool construction and migration running.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::error::StoreResult;

/// Maximum number of pooled connections.
const MAX_CONNECTIONS: u32 = 20;

/// How long `acquire()` waits for a free connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an idle connection is kept before being closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Connect to Postgres and run pending migrations embedded under
/// `migrations/` at compile time.
#[tracing::instrument(skip(database_url))]
pub async fn connect(database_url: &str) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(|e| super::error::StoreError::ConnectionFailed(e.to_string()))?;

    info!("running pending migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
