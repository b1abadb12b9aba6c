//! CRUD access to the `endpoints` table.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::StoreResult;
use super::models::{Endpoint, EndpointUpdate, NewEndpoint};

/// Insert a new endpoint. Fails with [`super::error::StoreError::DuplicateName`]
/// if another endpoint already has the same name case-insensitively
/// (spec.md §3: "display name (unique, case-insensitively)").
pub async fn create(pool: &PgPool, new: NewEndpoint) -> StoreResult<Endpoint> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, Endpoint>(
        r#"
        INSERT INTO endpoints
            (id, name, url, check_interval, timeout, expected_status,
             severity, enabled, tags, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        RETURNING id, name, url, check_interval, timeout, expected_status,
                  severity, enabled, tags, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(&new.url)
    .bind(new.check_interval)
    .bind(new.timeout)
    .bind(new.expected_status)
    .bind(new.severity)
    .bind(new.enabled)
    .bind(&new.tags)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single endpoint by id.
pub async fn get(pool: &PgPool, id: Uuid) -> StoreResult<Option<Endpoint>> {
    let row = sqlx::query_as::<_, Endpoint>(
        r#"
        SELECT id, name, url, check_interval, timeout, expected_status,
               severity, enabled, tags, created_at, updated_at
        FROM endpoints
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// List every endpoint, ordered by creation time.
pub async fn list(pool: &PgPool) -> StoreResult<Vec<Endpoint>> {
    let rows = sqlx::query_as::<_, Endpoint>(
        r#"
        SELECT id, name, url, check_interval, timeout, expected_status,
               severity, enabled, tags, created_at, updated_at
        FROM endpoints
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List only enabled endpoints — the set the scheduler is responsible for
/// keeping a running probe loop for (spec.md §4.5).
pub async fn list_enabled(pool: &PgPool) -> StoreResult<Vec<Endpoint>> {
    let rows = sqlx::query_as::<_, Endpoint>(
        r#"
        SELECT id, name, url, check_interval, timeout, expected_status,
               severity, enabled, tags, created_at, updated_at
        FROM endpoints
        WHERE enabled = TRUE
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Apply a sparse update. Returns `None` if no endpoint has this id.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    current: &Endpoint,
    patch: EndpointUpdate,
) -> StoreResult<Option<Endpoint>> {
    let name = patch.name.unwrap_or_else(|| current.name.clone());
    let url = patch.url.unwrap_or_else(|| current.url.clone());
    let check_interval = patch.check_interval.unwrap_or(current.check_interval);
    let timeout = patch.timeout.unwrap_or(current.timeout);
    let expected_status = patch.expected_status.unwrap_or(current.expected_status);
    let severity = patch.severity.unwrap_or(current.severity);
    let enabled = patch.enabled.unwrap_or(current.enabled);
    let tags = patch.tags.unwrap_or_else(|| current.tags.clone());

    let row = sqlx::query_as::<_, Endpoint>(
        r#"
        UPDATE endpoints
        SET name = $2, url = $3, check_interval = $4, timeout = $5,
            expected_status = $6, severity = $7, enabled = $8, tags = $9,
            updated_at = $10
        WHERE id = $1
        RETURNING id, name, url, check_interval, timeout, expected_status,
                  severity, enabled, tags, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(&name)
    .bind(&url)
    .bind(check_interval)
    .bind(timeout)
    .bind(expected_status)
    .bind(severity)
    .bind(enabled)
    .bind(&tags)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Delete an endpoint and everything derived from it (checks, aggregates)
/// via `ON DELETE CASCADE`. Returns whether a row was removed.
pub async fn delete(pool: &PgPool, id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM endpoints WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
