//! Rolling 24-hour statistics (spec.md §4.3).
//!
//! A pure function over an ordered slice of checks — no I/O, no store
//! dependency — so it is unit-tested directly the way the teacher tests
//! `util::format_uptime`-style helpers in `util.rs`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::{CheckStatus, UptimeCheck, UptimeStatistics};

/// How many of the most recent checks are surfaced in `recentChecks`.
const RECENT_CHECKS_LIMIT: usize = 10;

/// Round down to 2 decimal places, per spec.md's rounding rule — half-up
/// rounding would occasionally report 100.00% uptime for an endpoint that
/// had at least one failure.
fn floor2(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

/// Compute the rolling statistics for one endpoint from its checks in the
/// last 24 hours, ordered oldest-first, plus the full recent-check window
/// used for `recentChecks`.
///
/// `window_24h` and `recent` may overlap or differ in ordering — callers
/// typically fetch both from the store in one pass (`since` + `recent`).
/// `consecutive_failures` is the scheduler's own live counter (spec.md §3)
/// and is passed in rather than derived here, so a short-circuited
/// breaker-open check recorded in `recent` never gets double-counted.
pub fn compute(
    endpoint_id: Uuid,
    window_24h: &[UptimeCheck],
    recent: &[UptimeCheck],
    consecutive_failures: u32,
) -> UptimeStatistics {
    let total_checks = window_24h.len() as i64;
    let up_checks = window_24h
        .iter()
        .filter(|c| c.status == CheckStatus::Up)
        .count() as i64;
    let down_checks = total_checks - up_checks;

    let uptime_percentage = if total_checks == 0 {
        0.0
    } else {
        floor2((up_checks as f64 / total_checks as f64) * 100.0)
    };

    let avg_response_time = if total_checks == 0 {
        0.0
    } else {
        let sum: f64 = window_24h.iter().map(|c| c.response_time).sum();
        floor2(sum / total_checks as f64)
    };

    let last_check: Option<DateTime<Utc>> = recent.iter().map(|c| c.timestamp).max();
    let current_status = recent
        .iter()
        .max_by_key(|c| c.timestamp)
        .map(|c| c.status)
        .unwrap_or(CheckStatus::Up);

    let mut recent_sorted = recent.to_vec();
    recent_sorted.sort_by_key(|c| std::cmp::Reverse(c.timestamp));
    recent_sorted.truncate(RECENT_CHECKS_LIMIT);

    UptimeStatistics {
        endpoint_id,
        total_checks,
        up_checks,
        down_checks,
        uptime_percentage,
        avg_response_time,
        last_check,
        current_status,
        recent_checks: recent_sorted,
        consecutive_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn check(status: CheckStatus, minutes_ago: i64, response_time: f64) -> UptimeCheck {
        UptimeCheck {
            id: Uuid::new_v4(),
            endpoint_id: Uuid::nil(),
            endpoint_name: "svc".to_string(),
            status,
            status_code: if status == CheckStatus::Up { 200 } else { 503 },
            response_time,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            error_reason: None,
        }
    }

    #[test]
    fn empty_window_reports_zeroed_statistics() {
        let stats = compute(Uuid::nil(), &[], &[], 0);
        assert_eq!(stats.total_checks, 0);
        assert_eq!(stats.uptime_percentage, 0.0);
        assert_eq!(stats.current_status, CheckStatus::Up);
    }

    #[test]
    fn uptime_percentage_rounds_down() {
        let window = vec![
            check(CheckStatus::Up, 10, 100.0),
            check(CheckStatus::Up, 9, 100.0),
            check(CheckStatus::Down, 8, 100.0),
        ];
        let stats = compute(Uuid::nil(), &window, &window, 1);
        assert_eq!(stats.uptime_percentage, 66.66);
    }

    #[test]
    fn consecutive_failures_is_sourced_from_the_caller() {
        let recent = vec![
            check(CheckStatus::Up, 30, 50.0),
            check(CheckStatus::Down, 20, 50.0),
            check(CheckStatus::Down, 10, 50.0),
            check(CheckStatus::Down, 1, 50.0),
        ];
        let stats = compute(Uuid::nil(), &recent, &recent, 3);
        assert_eq!(stats.consecutive_failures, 3);
        let stats = compute(Uuid::nil(), &recent, &recent, 0);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn recent_checks_truncated_to_limit() {
        let recent: Vec<_> = (0..15)
            .map(|i| check(CheckStatus::Up, i, 50.0))
            .collect();
        let stats = compute(Uuid::nil(), &recent, &recent, 0);
        assert_eq!(stats.recent_checks.len(), RECENT_CHECKS_LIMIT);
    }

    #[test]
    fn current_status_is_the_most_recent_check() {
        let recent = vec![check(CheckStatus::Up, 10, 50.0), check(CheckStatus::Down, 1, 50.0)];
        let stats = compute(Uuid::nil(), &recent, &recent, 1);
        assert_eq!(stats.current_status, CheckStatus::Down);
    }
}
