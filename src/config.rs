//! Environment-driven configuration.
//!
//! The core has no operator-facing config file of its own — the REST layer
//! that owns `AddEndpoint`/`UpdateEndpoint` etc. is out of scope here — so
//! every knob in spec.md §6 is read from the process environment, the way
//! the teacher's `bin/hub.rs` reads `DATABASE_URL`-shaped settings before
//! handing a resolved config to the actors.

use std::time::Duration;

use crate::error::WatchtowerError;

/// Resolved configuration for one [`crate::scheduler::Engine`] instance.
#[derive(Debug, Clone)]
pub struct WatchtowerConfig {
    /// Postgres connection string. Required.
    pub database_url: String,

    /// Live event bus capacity controls.
    pub bus: BusConfig,

    /// Retention & roll-up job configuration.
    pub retention: RetentionConfig,

    /// Circuit breaker defaults applied to every endpoint (spec.md §4.4).
    pub breaker: BreakerDefaults,
}

/// Live Event Bus capacity knobs (spec.md §4.6).
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    pub max_clients: usize,
    pub max_rooms_per_client: usize,
    pub client_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_clients: 100,
            max_rooms_per_client: 10,
            client_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Retention job configuration (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub detail_retention_days: i64,
    pub hourly_retention_days: i64,
    pub daily_retention_days: i64,
    pub batch_size: i64,
    pub delete_enabled: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            detail_retention_days: 7,
            hourly_retention_days: 30,
            daily_retention_days: 90,
            batch_size: 10_000,
            delete_enabled: true,
        }
    }
}

/// Per-endpoint circuit breaker defaults (spec.md §4.4 step 2).
///
/// `reset_timeout` is derived per-endpoint (`3 * checkInterval`), so only
/// the interval-independent knobs live here.
#[derive(Debug, Clone, Copy)]
pub struct BreakerDefaults {
    pub failure_threshold_pct: u8,
    pub monitoring_period: Duration,
    pub minimum_requests: usize,
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            failure_threshold_pct: 70,
            monitoring_period: Duration::from_secs(300),
            minimum_requests: 3,
        }
    }
}

impl WatchtowerConfig {
    /// Build configuration from environment variables, applying the
    /// defaults of spec.md §4.6/§4.7/§4.4 for anything unset.
    ///
    /// `.env` is loaded first (if present), mirroring `dotenv().ok()` in
    /// the teacher's binaries.
    pub fn from_env() -> Result<Self, WatchtowerError> {
        Self::from_env_file(None)
    }

    /// Like [`WatchtowerConfig::from_env`], but loads a specific dotenv
    /// file instead of searching for `.env` — used by `--env-file`.
    pub fn from_env_file(env_file: Option<&str>) -> Result<Self, WatchtowerError> {
        match env_file {
            Some(path) => {
                dotenv::from_path(path)
                    .map_err(|e| WatchtowerError::Config(format!("failed to load {path}: {e}")))?;
            }
            None => {
                let _ = dotenv::dotenv();
            }
        }

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| WatchtowerError::Config("DATABASE_URL is required".to_string()))?;

        let mut bus = BusConfig::default();
        if let Some(v) = env_usize("MAX_CLIENTS")? {
            bus.max_clients = v;
        }
        if let Some(v) = env_usize("MAX_ROOMS_PER_CLIENT")? {
            bus.max_rooms_per_client = v;
        }
        if let Some(v) = env_u64("CLIENT_TIMEOUT_MS")? {
            bus.client_timeout = Duration::from_millis(v);
        }

        let mut retention = RetentionConfig::default();
        if let Some(v) = env_i64("DETAIL_RETENTION_DAYS")? {
            retention.detail_retention_days = v;
        }
        if let Some(v) = env_i64("HOURLY_RETENTION_DAYS")? {
            retention.hourly_retention_days = v;
        }
        if let Some(v) = env_i64("DAILY_RETENTION_DAYS")? {
            retention.daily_retention_days = v;
        }
        if let Some(v) = env_i64("CLEANUP_BATCH_SIZE")? {
            retention.batch_size = v;
        }
        if let Some(v) = env_bool("CLEANUP_ENABLED")? {
            retention.delete_enabled = v;
        }

        Ok(Self {
            database_url,
            bus,
            retention,
            breaker: BreakerDefaults::default(),
        })
    }
}

fn env_var(key: &str) -> Result<Option<String>, WatchtowerError> {
    match std::env::var(key) {
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => {
            Err(WatchtowerError::Config(format!("{key} is not valid unicode")))
        }
    }
}

fn env_usize(key: &str) -> Result<Option<usize>, WatchtowerError> {
    env_var(key)?
        .map(|v| {
            v.parse()
                .map_err(|_| WatchtowerError::Config(format!("{key} must be a non-negative integer")))
        })
        .transpose()
}

fn env_u64(key: &str) -> Result<Option<u64>, WatchtowerError> {
    env_var(key)?
        .map(|v| {
            v.parse()
                .map_err(|_| WatchtowerError::Config(format!("{key} must be a non-negative integer")))
        })
        .transpose()
}

fn env_i64(key: &str) -> Result<Option<i64>, WatchtowerError> {
    env_var(key)?
        .map(|v| {
            v.parse()
                .map_err(|_| WatchtowerError::Config(format!("{key} must be an integer")))
        })
        .transpose()
}

fn env_bool(key: &str) -> Result<Option<bool>, WatchtowerError> {
    env_var(key)?
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(WatchtowerError::Config(format!("{key} must be a boolean"))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_config_defaults_match_spec() {
        let bus = BusConfig::default();
        assert_eq!(bus.max_clients, 100);
        assert_eq!(bus.max_rooms_per_client, 10);
        assert_eq!(bus.client_timeout, Duration::from_secs(300));
    }

    #[test]
    fn retention_config_defaults_match_spec() {
        let r = RetentionConfig::default();
        assert_eq!(r.detail_retention_days, 7);
        assert_eq!(r.hourly_retention_days, 30);
        assert_eq!(r.daily_retention_days, 90);
        assert_eq!(r.batch_size, 10_000);
        assert!(r.delete_enabled);
    }

    #[test]
    fn breaker_defaults_match_spec() {
        let b = BreakerDefaults::default();
        assert_eq!(b.failure_threshold_pct, 70);
        assert_eq!(b.monitoring_period, Duration::from_secs(300));
        assert_eq!(b.minimum_requests, 3);
    }
}
