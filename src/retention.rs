//! Retention and roll-up job (spec.md §4.7).
//!
//! Grounded on the teacher's `actors::storage` cleanup pass (a
//! `CLEANUP_INTERVAL`-driven task that batches deletes and swallows
//! individual failures) generalized to a daily timer that first rolls
//! detail checks up into hourly/daily aggregates, then prunes, the way
//! spec.md §4.7 orders the steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::store::aggregates::{DailyRollup, HourlyRollup};
use crate::store::{CheckStatus, Store, StoreResult};

/// How often the job wakes up to check whether it's time to run.
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// How far back the job looks for un-rolled-up checks on each run. Wider
/// than 24h so a missed run doesn't leave a permanent gap.
const ROLLUP_LOOKBACK: ChronoDuration = ChronoDuration::hours(48);

pub struct RetentionJob {
    store: Store,
    config: RetentionConfig,
    running: AtomicBool,
}

impl RetentionJob {
    pub fn new(store: Store, config: RetentionConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            running: AtomicBool::new(false),
        })
    }

    /// Spawn the daily timer loop. The returned handle can be aborted on
    /// shutdown.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    warn!(error = %err, "retention run failed");
                }
            }
        })
    }

    /// Run one retention pass: roll up, then prune. Guarded against
    /// re-entrancy — if a previous run is still in flight (e.g. a slow
    /// vacuum), this call is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> StoreResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("retention run already in progress, skipping");
            return Ok(());
        }
        let result = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self) -> StoreResult<()> {
        let now = Utc::now();

        self.roll_up_hourly(now).await?;
        self.roll_up_daily(now).await?;

        if self.config.delete_enabled {
            let detail_cutoff = now - ChronoDuration::days(self.config.detail_retention_days);
            let removed = crate::store::checks::delete_older_than(
                self.store.pool(),
                detail_cutoff,
                self.config.batch_size,
            )
            .await?;
            info!(removed, "pruned detail checks");

            let hourly_cutoff = now - ChronoDuration::days(self.config.hourly_retention_days);
            crate::store::aggregates::delete_hourly_older_than(
                self.store.pool(),
                hourly_cutoff,
                self.config.batch_size,
            )
            .await?;

            let daily_cutoff = now - ChronoDuration::days(self.config.daily_retention_days);
            crate::store::aggregates::delete_daily_older_than(
                self.store.pool(),
                daily_cutoff,
                self.config.batch_size,
            )
            .await?;

            self.vacuum_analyze().await;
        }

        Ok(())
    }

    async fn roll_up_hourly(&self, now: DateTime<Utc>) -> StoreResult<()> {
        let since = now - ROLLUP_LOOKBACK;
        let buckets = crate::store::aggregates::distinct_hours_since(self.store.pool(), since).await?;
        for (endpoint_id, hour_start) in buckets {
            let hour_end = hour_start + ChronoDuration::hours(1);
            let checks = self.store.checks_since(endpoint_id, hour_start).await?;
            let checks: Vec<_> = checks.into_iter().filter(|c| c.timestamp < hour_end).collect();
            if checks.is_empty() {
                continue;
            }
            let endpoint_name = checks[0].endpoint_name.clone();
            let rollup = fold_hourly(endpoint_id, endpoint_name, hour_start, &checks);
            crate::store::aggregates::upsert_hourly(self.store.pool(), &rollup).await?;
        }
        Ok(())
    }

    async fn roll_up_daily(&self, now: DateTime<Utc>) -> StoreResult<()> {
        let since = (now - ROLLUP_LOOKBACK)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let buckets = crate::store::aggregates::distinct_hours_since(self.store.pool(), since).await?;
        let mut days: std::collections::HashSet<(uuid::Uuid, DateTime<Utc>)> =
            std::collections::HashSet::new();
        for (endpoint_id, hour_start) in buckets {
            let day_start = hour_start
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc();
            days.insert((endpoint_id, day_start));
        }
        for (endpoint_id, day_start) in days {
            let day_end = day_start + ChronoDuration::days(1);
            let checks = self.store.checks_since(endpoint_id, day_start).await?;
            let checks: Vec<_> = checks.into_iter().filter(|c| c.timestamp < day_end).collect();
            if checks.is_empty() {
                continue;
            }
            let endpoint_name = checks[0].endpoint_name.clone();
            let rollup = fold_daily(endpoint_id, endpoint_name, day_start, &checks);
            crate::store::aggregates::upsert_daily(self.store.pool(), &rollup).await?;
        }
        Ok(())
    }

    /// `VACUUM ANALYZE` the detail table after a prune. Best-effort —
    /// failures are logged, never propagated, since the retention job's
    /// correctness never depends on this having run.
    async fn vacuum_analyze(&self) {
        if let Err(err) = sqlx::query("VACUUM ANALYZE uptime_checks")
            .execute(self.store.pool())
            .await
        {
            warn!(error = %err, "vacuum analyze failed");
        }
    }
}

fn fold_hourly(
    endpoint_id: uuid::Uuid,
    endpoint_name: String,
    hour_start: DateTime<Utc>,
    checks: &[crate::store::UptimeCheck],
) -> HourlyRollup {
    let (successful, failed, avg, min, max) = fold_counts(checks);
    HourlyRollup {
        endpoint_id,
        endpoint_name,
        hour_start,
        total_checks: checks.len() as i64,
        successful_checks: successful,
        failed_checks: failed,
        avg_response_time: avg,
        min_response_time: min,
        max_response_time: max,
    }
}

fn fold_daily(
    endpoint_id: uuid::Uuid,
    endpoint_name: String,
    day_start: DateTime<Utc>,
    checks: &[crate::store::UptimeCheck],
) -> DailyRollup {
    let (successful, failed, avg, min, max) = fold_counts(checks);
    let total = checks.len() as i64;
    let uptime_percentage = if total == 0 {
        0.0
    } else {
        (successful as f64 / total as f64 * 100.0 * 100.0).floor() / 100.0
    };
    DailyRollup {
        endpoint_id,
        endpoint_name,
        day_start,
        total_checks: total,
        successful_checks: successful,
        failed_checks: failed,
        avg_response_time: avg,
        min_response_time: min,
        max_response_time: max,
        uptime_percentage,
    }
}

fn fold_counts(checks: &[crate::store::UptimeCheck]) -> (i64, i64, f64, f64, f64) {
    let successful = checks.iter().filter(|c| c.status == CheckStatus::Up).count() as i64;
    let failed = checks.len() as i64 - successful;
    let times: Vec<f64> = checks.iter().map(|c| c.response_time).collect();
    let avg = if times.is_empty() {
        0.0
    } else {
        times.iter().sum::<f64>() / times.len() as f64
    };
    let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (successful, failed, avg, if min.is_finite() { min } else { 0.0 }, if max.is_finite() { max } else { 0.0 })
}
