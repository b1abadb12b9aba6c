//! Access to the `uptime_checks` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::StoreResult;
use super::models::{NewUptimeCheck, UptimeCheck};

/// Persist one probe outcome.
pub async fn insert(pool: &PgPool, check: NewUptimeCheck) -> StoreResult<UptimeCheck> {
    let row = sqlx::query_as::<_, UptimeCheck>(
        r#"
        INSERT INTO uptime_checks
            (id, endpoint_id, endpoint_name, status, status_code,
             response_time, timestamp, error_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, endpoint_id, endpoint_name, status, status_code,
                  response_time, timestamp, error_reason
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(check.endpoint_id)
    .bind(&check.endpoint_name)
    .bind(check.status)
    .bind(check.status_code)
    .bind(check.response_time)
    .bind(Utc::now())
    .bind(&check.error_reason)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// The most recent checks for an endpoint, newest first, used both for the
/// `recentChecks` window of `UptimeStatistics` (spec.md §3) and for quickly
/// computing `consecutiveFailures` off of the tail.
pub async fn recent(pool: &PgPool, endpoint_id: Uuid, limit: i64) -> StoreResult<Vec<UptimeCheck>> {
    let rows = sqlx::query_as::<_, UptimeCheck>(
        r#"
        SELECT id, endpoint_id, endpoint_name, status, status_code,
               response_time, timestamp, error_reason
        FROM uptime_checks
        WHERE endpoint_id = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(endpoint_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Every check at or after `since`, oldest first — the window
/// [`crate::stats::compute`] folds over for the rolling 24h statistics.
pub async fn since(
    pool: &PgPool,
    endpoint_id: Uuid,
    since: DateTime<Utc>,
) -> StoreResult<Vec<UptimeCheck>> {
    let rows = sqlx::query_as::<_, UptimeCheck>(
        r#"
        SELECT id, endpoint_id, endpoint_name, status, status_code,
               response_time, timestamp, error_reason
        FROM uptime_checks
        WHERE endpoint_id = $1 AND timestamp >= $2
        ORDER BY timestamp ASC
        "#,
    )
    .bind(endpoint_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete checks older than `before` in batches of `batch_size`, sleeping
/// briefly between batches (spec.md §4.7 step 2). Returns the total number
/// of rows removed.
pub async fn delete_older_than(
    pool: &PgPool,
    before: DateTime<Utc>,
    batch_size: i64,
) -> StoreResult<u64> {
    let mut total = 0u64;
    loop {
        let result = sqlx::query(
            r#"
            DELETE FROM uptime_checks
            WHERE id IN (
                SELECT id FROM uptime_checks
                WHERE timestamp < $1
                LIMIT $2
            )
            "#,
        )
        .bind(before)
        .bind(batch_size)
        .execute(pool)
        .await?;

        let affected = result.rows_affected();
        total += affected;
        if affected == 0 || (affected as i64) < batch_size {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    Ok(total)
}
