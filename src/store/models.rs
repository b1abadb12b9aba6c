//! Domain row types for endpoints, checks, and their aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WatchtowerError;

/// Severity assigned to an endpoint by its operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// The outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

/// A monitored HTTP(S) endpoint (spec.md §3, "Endpoint").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Endpoint {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub check_interval: i32,
    pub timeout: i32,
    pub expected_status: i32,
    pub severity: Severity,
    pub enabled: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an operator supplies when registering an endpoint. Validated by
/// [`NewEndpoint::validate`] before it ever reaches the store.
#[derive(Debug, Clone)]
pub struct NewEndpoint {
    pub name: String,
    pub url: String,
    pub check_interval: i32,
    pub timeout: i32,
    pub expected_status: i32,
    pub severity: Severity,
    pub enabled: bool,
    pub tags: Vec<String>,
}

/// A sparse update: `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct EndpointUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub check_interval: Option<i32>,
    pub timeout: Option<i32>,
    pub expected_status: Option<i32>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl NewEndpoint {
    /// Validate the invariants of spec.md §3: `checkInterval` in [5, 3600],
    /// `timeout` in [1, 60] and strictly less than `checkInterval`,
    /// `expectedStatus` in [100, 599], URL scheme in {http, https}, at most
    /// 10 tags of at most 50 chars each.
    pub fn validate(&self) -> Result<(), WatchtowerError> {
        validate_url(&self.url)?;
        validate_interval_timeout(self.check_interval, self.timeout)?;
        validate_expected_status(self.expected_status)?;
        validate_tags(&self.tags)?;
        if self.name.trim().is_empty() {
            return Err(WatchtowerError::Validation(
                "name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl EndpointUpdate {
    /// Validate only the fields that are present; interval/timeout are
    /// checked together whenever either is supplied, against the
    /// endpoint's current value for the other.
    pub fn validate(&self, current: &Endpoint) -> Result<(), WatchtowerError> {
        if let Some(ref url) = self.url {
            validate_url(url)?;
        }
        if self.check_interval.is_some() || self.timeout.is_some() {
            let interval = self.check_interval.unwrap_or(current.check_interval);
            let timeout = self.timeout.unwrap_or(current.timeout);
            validate_interval_timeout(interval, timeout)?;
        }
        if let Some(status) = self.expected_status {
            validate_expected_status(status)?;
        }
        if let Some(ref tags) = self.tags {
            validate_tags(tags)?;
        }
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(WatchtowerError::Validation(
                "name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_url(url: &str) -> Result<(), WatchtowerError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WatchtowerError::Validation(format!("invalid url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WatchtowerError::Validation(format!(
            "unsupported url scheme '{other}', expected http or https"
        ))),
    }
}

fn validate_interval_timeout(check_interval: i32, timeout: i32) -> Result<(), WatchtowerError> {
    if !(5..=3600).contains(&check_interval) {
        return Err(WatchtowerError::Validation(
            "checkInterval must be between 5 and 3600 seconds".to_string(),
        ));
    }
    if !(1..=60).contains(&timeout) {
        return Err(WatchtowerError::Validation(
            "timeout must be between 1 and 60 seconds".to_string(),
        ));
    }
    if timeout >= check_interval {
        return Err(WatchtowerError::Validation(
            "timeout must be strictly less than checkInterval".to_string(),
        ));
    }
    Ok(())
}

fn validate_expected_status(status: i32) -> Result<(), WatchtowerError> {
    if !(100..=599).contains(&status) {
        return Err(WatchtowerError::Validation(
            "expectedStatus must be between 100 and 599".to_string(),
        ));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), WatchtowerError> {
    if tags.len() > 10 {
        return Err(WatchtowerError::Validation(
            "at most 10 tags are allowed".to_string(),
        ));
    }
    if let Some(bad) = tags.iter().find(|t| t.len() > 50) {
        return Err(WatchtowerError::Validation(format!(
            "tag '{bad}' exceeds 50 characters"
        )));
    }
    Ok(())
}

/// One probe outcome (spec.md §3, "UptimeCheck"). Immutable after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UptimeCheck {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub endpoint_name: String,
    pub status: CheckStatus,
    pub status_code: i32,
    pub response_time: f64,
    pub timestamp: DateTime<Utc>,
    pub error_reason: Option<String>,
}

/// A new check prior to insertion (id/timestamp assigned by the store).
#[derive(Debug, Clone)]
pub struct NewUptimeCheck {
    pub endpoint_id: Uuid,
    pub endpoint_name: String,
    pub status: CheckStatus,
    pub status_code: i32,
    pub response_time: f64,
    pub error_reason: Option<String>,
}

/// Hourly roll-up row, keyed by (endpoint_id, hour_start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HourlyAggregate {
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

/// Daily roll-up row, keyed by (endpoint_id, day_start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyAggregate {
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

/// Derived 24-hour rolling view per endpoint (spec.md §3,
/// "UptimeStatistics"). Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeStatistics {
    pub endpoint_id: Uuid,
    pub total_checks: i64,
    pub up_checks: i64,
    pub down_checks: i64,
    pub uptime_percentage: f64,
    pub avg_response_time: f64,
    pub last_check: Option<DateTime<Utc>>,
    pub current_status: CheckStatus,
    pub recent_checks: Vec<UptimeCheck>,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NewEndpoint {
        NewEndpoint {
            name: "web".to_string(),
            url: "https://example.com".to_string(),
            check_interval: 30,
            timeout: 5,
            expected_status: 200,
            severity: Severity::Medium,
            enabled: true,
            tags: vec![],
        }
    }

    #[test]
    fn accepts_well_formed_endpoint() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let mut e = base();
        e.url = "ftp://example.com".to_string();
        assert!(e.validate().is_err());
    }

    #[test]
    fn rejects_timeout_not_less_than_interval() {
        let mut e = base();
        e.check_interval = 10;
        e.timeout = 10;
        assert!(e.validate().is_err());
    }

    #[test]
    fn rejects_interval_out_of_range() {
        let mut e = base();
        e.check_interval = 3601;
        assert!(e.validate().is_err());
    }

    #[test]
    fn rejects_expected_status_out_of_range() {
        let mut e = base();
        e.expected_status = 999;
        assert!(e.validate().is_err());
    }

    #[test]
    fn rejects_too_many_tags() {
        let mut e = base();
        e.tags = (0..11).map(|i| i.to_string()).collect();
        assert!(e.validate().is_err());
    }

    #[test]
    fn rejects_oversized_tag() {
        let mut e = base();
        e.tags = vec!["x".repeat(51)];
        assert!(e.validate().is_err());
    }
}
