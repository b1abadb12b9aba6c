//! Hourly/daily roll-up upserts and pruning.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::StoreResult;

/// One hour's worth of folded checks for a single endpoint, computed by the
/// retention job before being upserted.
#[derive(Debug, Clone)]
pub struct HourlyRollup {
    pub endpoint_id: Uuid,
    pub endpoint_name: String,
    pub hour_start: DateTime<Utc>,
    pub total_checks: i64,
    pub successful_checks: i64,
    pub failed_checks: i64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
}

/// One day's worth of folded checks for a single endpoint.
#[derive(Debug, Clone)]
pub struct DailyRollup {
    pub endpoint_id: Uuid,
    pub endpoint_name: String,
    pub day_start: DateTime<Utc>,
    pub total_checks: i64,
    pub successful_checks: i64,
    pub failed_checks: i64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub uptime_percentage: f64,
}

/// Upsert an hourly aggregate row, re-computing it in place if the hour was
/// already rolled up (spec.md §4.7 step 1: "ON CONFLICT DO UPDATE").
pub async fn upsert_hourly(pool: &PgPool, r: &HourlyRollup) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO uptime_checks_hourly
            (endpoint_id, endpoint_name, hour_start, total_checks,
             successful_checks, failed_checks, avg_response_time,
             min_response_time, max_response_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (endpoint_id, hour_start) DO UPDATE SET
            endpoint_name = EXCLUDED.endpoint_name,
            total_checks = EXCLUDED.total_checks,
            successful_checks = EXCLUDED.successful_checks,
            failed_checks = EXCLUDED.failed_checks,
            avg_response_time = EXCLUDED.avg_response_time,
            min_response_time = EXCLUDED.min_response_time,
            max_response_time = EXCLUDED.max_response_time
        "#,
    )
    .bind(r.endpoint_id)
    .bind(&r.endpoint_name)
    .bind(r.hour_start)
    .bind(r.total_checks)
    .bind(r.successful_checks)
    .bind(r.failed_checks)
    .bind(r.avg_response_time)
    .bind(r.min_response_time)
    .bind(r.max_response_time)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert a daily aggregate row.
pub async fn upsert_daily(pool: &PgPool, r: &DailyRollup) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO uptime_checks_daily
            (endpoint_id, endpoint_name, day_start, total_checks,
             successful_checks, failed_checks, avg_response_time,
             min_response_time, max_response_time, uptime_percentage)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (endpoint_id, day_start) DO UPDATE SET
            endpoint_name = EXCLUDED.endpoint_name,
            total_checks = EXCLUDED.total_checks,
            successful_checks = EXCLUDED.successful_checks,
            failed_checks = EXCLUDED.failed_checks,
            avg_response_time = EXCLUDED.avg_response_time,
            min_response_time = EXCLUDED.min_response_time,
            max_response_time = EXCLUDED.max_response_time,
            uptime_percentage = EXCLUDED.uptime_percentage
        "#,
    )
    .bind(r.endpoint_id)
    .bind(&r.endpoint_name)
    .bind(r.day_start)
    .bind(r.total_checks)
    .bind(r.successful_checks)
    .bind(r.failed_checks)
    .bind(r.avg_response_time)
    .bind(r.min_response_time)
    .bind(r.max_response_time)
    .bind(r.uptime_percentage)
    .execute(pool)
    .await?;

    Ok(())
}

/// Distinct (endpoint_id, hour_start) buckets that have at least one
/// unrolled check at or after `since` — the retention job's work list for
/// the hourly pass.
pub async fn distinct_hours_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> StoreResult<Vec<(Uuid, DateTime<Utc>)>> {
    let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT DISTINCT endpoint_id, date_trunc('hour', timestamp) AS hour_start
        FROM uptime_checks
        WHERE timestamp >= $1
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete hourly aggregates older than `before`, batched.
pub async fn delete_hourly_older_than(
    pool: &PgPool,
    before: DateTime<Utc>,
    batch_size: i64,
) -> StoreResult<u64> {
    delete_aggregate_batched(pool, "uptime_checks_hourly", "hour_start", before, batch_size).await
}

/// Delete daily aggregates older than `before`, batched.
pub async fn delete_daily_older_than(
    pool: &PgPool,
    before: DateTime<Utc>,
    batch_size: i64,
) -> StoreResult<u64> {
    delete_aggregate_batched(pool, "uptime_checks_daily", "day_start", before, batch_size).await
}

async fn delete_aggregate_batched(
    pool: &PgPool,
    table: &str,
    column: &str,
    before: DateTime<Utc>,
    batch_size: i64,
) -> StoreResult<u64> {
    let mut total = 0u64;
    loop {
        let sql = format!(
            "DELETE FROM {table} WHERE ({column}, endpoint_id) IN \
             (SELECT {column}, endpoint_id FROM {table} WHERE {column} < $1 LIMIT $2)"
        );
        let result = sqlx::query(&sql)
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
