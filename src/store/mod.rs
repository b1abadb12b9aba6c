//! Relational store adapter (spec.md §6).
//!
//! Grounded on the teacher's `storage::backend`/`storage::sqlite` split, but
//! backed by Postgres rather than SQLite — `other_examples`' `uptime-forge`
//! crate shows the same domain on `sqlx::PgPool`, and spec.md §6's DDL
//! (`uuid`, `text[]`, `timestamptz`, `ON CONFLICT`) is Postgres-shaped.

pub mod aggregates;
pub mod checks;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod pool;

pub use error::{StoreError, StoreResult};
pub use models::{
    CheckStatus, DailyAggregate, Endpoint, EndpointUpdate, HourlyAggregate, NewEndpoint,
    NewUptimeCheck, Severity, UptimeCheck, UptimeStatistics,
};
pub use pool::connect;

use sqlx::PgPool;

/// A cloneable handle to the relational store. Thin wrapper over `PgPool`
/// so callers (scheduler, prober, retention job) share one pool without
/// needing their own `sqlx` imports.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect and run migrations.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = pool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Build a `Store` from an already-open pool (used by tests that share
    /// one pool across multiple components).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool for modules that need raw queries
    /// (e.g. the retention job's aggregate work-list queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create_endpoint(&self, new: NewEndpoint) -> StoreResult<Endpoint> {
        endpoints::create(&self.pool, new).await
    }

    pub async fn get_endpoint(&self, id: uuid::Uuid) -> StoreResult<Option<Endpoint>> {
        endpoints::get(&self.pool, id).await
    }

    pub async fn list_endpoints(&self) -> StoreResult<Vec<Endpoint>> {
        endpoints::list(&self.pool).await
    }

    pub async fn list_enabled_endpoints(&self) -> StoreResult<Vec<Endpoint>> {
        endpoints::list_enabled(&self.pool).await
    }

    pub async fn update_endpoint(
        &self,
        id: uuid::Uuid,
        current: &Endpoint,
        patch: EndpointUpdate,
    ) -> StoreResult<Option<Endpoint>> {
        endpoints::update(&self.pool, id, current, patch).await
    }

    pub async fn delete_endpoint(&self, id: uuid::Uuid) -> StoreResult<bool> {
        endpoints::delete(&self.pool, id).await
    }

    pub async fn insert_check(&self, check: NewUptimeCheck) -> StoreResult<UptimeCheck> {
        checks::insert(&self.pool, check).await
    }

    pub async fn recent_checks(
        &self,
        endpoint_id: uuid::Uuid,
        limit: i64,
    ) -> StoreResult<Vec<UptimeCheck>> {
        checks::recent(&self.pool, endpoint_id, limit).await
    }

    pub async fn checks_since(
        &self,
        endpoint_id: uuid::Uuid,
        since: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<Vec<UptimeCheck>> {
        checks::since(&self.pool, endpoint_id, since).await
    }
}
