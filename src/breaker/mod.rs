//! Per-endpoint circuit breaker (spec.md §4.4 step 2).
//!
//! Grounded on `other_examples`' `attakdefand-DECENTRALIZED-APP`
//! `resilience_availability.rs`: a `CircuitBreakerState` enum plus a struct
//! that records outcomes and reports `(old_state, new_state)` transitions,
//! generalized here to a sliding failure-rate window instead of a bare
//! consecutive-failure count, and wired to a per-endpoint registry the way
//! the teacher's `actors` module keys per-server state off a handle map.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The three states of a single endpoint's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Errors a caller of [`CircuitBreaker::try_acquire`] can observe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreakerError {
    /// The breaker is open and `resetTimeout` has not yet elapsed.
    #[error("circuit is open")]
    OpenCircuit,
}

/// Breaker tuning, derived from [`crate::config::BreakerDefaults`] plus the
/// endpoint's own `checkInterval` (`resetTimeout = 3 * checkInterval`).
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold_pct: u8,
    pub reset_timeout: Duration,
    pub monitoring_period: Duration,
    pub minimum_requests: usize,
}

impl BreakerConfig {
    pub fn for_endpoint(defaults: &crate::config::BreakerDefaults, check_interval_secs: i32) -> Self {
        Self {
            failure_threshold_pct: defaults.failure_threshold_pct,
            reset_timeout: Duration::from_secs(3 * check_interval_secs.max(0) as u64),
            monitoring_period: defaults.monitoring_period,
            minimum_requests: defaults.minimum_requests,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    at: DateTime<Utc>,
    success: bool,
}

/// A single endpoint's circuit breaker: a sliding window of recent outcomes
/// plus the CLOSED/OPEN/HALF_OPEN state machine over it.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    window: VecDeque<Outcome>,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            window: VecDeque::new(),
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Called before a probe runs. OPEN rejects the probe outright unless
    /// `resetTimeout` has elapsed, in which case the breaker moves to
    /// HALF_OPEN and allows exactly this one trial probe through.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> Result<(), BreakerError> {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| now.signed_duration_since(t))
                    .unwrap_or_default();
                if elapsed.to_std().unwrap_or_default() >= self.config.reset_timeout {
                    self.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(BreakerError::OpenCircuit)
                }
            }
        }
    }

    /// Record a probe outcome and apply the state transition, if any.
    /// Returns `Some((old, new))` when the state changed.
    pub fn record(&mut self, now: DateTime<Utc>, success: bool) -> Option<(BreakerState, BreakerState)> {
        self.window.push_back(Outcome { at: now, success });
        self.evict_expired(now);

        let old = self.state;
        match old {
            BreakerState::HalfOpen => {
                self.state = if success {
                    self.window.clear();
                    BreakerState::Closed
                } else {
                    self.opened_at = Some(now);
                    BreakerState::Open
                };
            }
            BreakerState::Closed => {
                if self.window.len() >= self.config.minimum_requests && self.failure_rate_pct() >= self.config.failure_threshold_pct {
                    self.opened_at = Some(now);
                    self.state = BreakerState::Open;
                }
            }
            BreakerState::Open => {}
        }

        if self.state == old {
            None
        } else {
            Some((old, self.state))
        }
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::from_std(self.config.monitoring_period).unwrap_or_default();
        while let Some(front) = self.window.front() {
            if front.at < cutoff {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn failure_rate_pct(&self) -> u8 {
        if self.window.is_empty() {
            return 0;
        }
        let failures = self.window.iter().filter(|o| !o.success).count();
        ((failures * 100) / self.window.len()) as u8
    }
}

/// A transition observed by [`BreakerRegistry::record`], handed back to the
/// caller to log or act on (spec.md names no bus event for this — only
/// the DOWN check the rejected probe itself produces is published).
#[derive(Debug, Clone, Copy)]
pub struct BreakerTransition {
    pub endpoint_id: Uuid,
    pub old_state: BreakerState,
    pub new_state: BreakerState,
}

/// Keeps one [`CircuitBreaker`] per endpoint. The teacher keys per-server
/// actor handles the same way in `actors::service_monitor`.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<Uuid, CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a breaker for an endpoint, replacing any existing one.
    pub async fn register(&self, endpoint_id: Uuid, config: BreakerConfig) {
        self.breakers
            .write()
            .await
            .insert(endpoint_id, CircuitBreaker::new(config));
    }

    pub async fn remove(&self, endpoint_id: Uuid) {
        self.breakers.write().await.remove(&endpoint_id);
    }

    pub async fn state(&self, endpoint_id: Uuid) -> Option<BreakerState> {
        self.breakers.read().await.get(&endpoint_id).map(|b| b.state())
    }

    /// Check whether a probe is allowed to proceed for this endpoint.
    pub async fn try_acquire(&self, endpoint_id: Uuid, now: DateTime<Utc>) -> Result<(), BreakerError> {
        match self.breakers.write().await.get_mut(&endpoint_id) {
            Some(b) => b.try_acquire(now),
            None => Ok(()),
        }
    }

    /// Record an outcome, returning a transition if the breaker flipped.
    pub async fn record(
        &self,
        endpoint_id: Uuid,
        now: DateTime<Utc>,
        success: bool,
    ) -> Option<BreakerTransition> {
        let mut guard = self.breakers.write().await;
        let breaker = guard.get_mut(&endpoint_id)?;
        breaker
            .record(now, success)
            .map(|(old_state, new_state)| BreakerTransition {
                endpoint_id,
                old_state,
                new_state,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BreakerConfig {
        BreakerConfig {
            failure_threshold_pct: 70,
            reset_timeout: Duration::from_secs(90),
            monitoring_period: Duration::from_secs(300),
            minimum_requests: 3,
        }
    }

    #[test]
    fn stays_closed_below_minimum_requests() {
        let mut b = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        assert!(b.record(t0, false).is_none());
        assert!(b.record(t0, false).is_none());
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn opens_when_failure_rate_crosses_threshold() {
        let mut b = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        b.record(t0, false);
        b.record(t0, false);
        let transition = b.record(t0, false);
        assert_eq!(transition, Some((BreakerState::Closed, BreakerState::Open)));
    }

    #[test]
    fn rejects_while_open_before_reset_timeout() {
        let mut b = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        b.record(t0, false);
        b.record(t0, false);
        b.record(t0, false);
        assert_eq!(b.state(), BreakerState::Open);
        assert_eq!(b.try_acquire(t0 + chrono::Duration::seconds(10)), Err(BreakerError::OpenCircuit));
    }

    #[test]
    fn half_opens_after_reset_timeout_and_closes_on_success() {
        let mut b = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        b.record(t0, false);
        b.record(t0, false);
        b.record(t0, false);
        let t1 = t0 + chrono::Duration::seconds(91);
        assert!(b.try_acquire(t1).is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        let transition = b.record(t1, true);
        assert_eq!(transition, Some((BreakerState::HalfOpen, BreakerState::Closed)));
    }

    #[test]
    fn half_open_failure_reopens() {
        let mut b = CircuitBreaker::new(cfg());
        let t0 = Utc::now();
        b.record(t0, false);
        b.record(t0, false);
        b.record(t0, false);
        let t1 = t0 + chrono::Duration::seconds(91);
        b.try_acquire(t1).unwrap();
        let transition = b.record(t1, false);
        assert_eq!(transition, Some((BreakerState::HalfOpen, BreakerState::Open)));
    }

    #[tokio::test]
    async fn registry_tracks_per_endpoint_state() {
        let registry = BreakerRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id, cfg()).await;
        let now = Utc::now();
        registry.record(id, now, false).await;
        registry.record(id, now, false).await;
        let transition = registry.record(id, now, false).await;
        assert!(transition.is_some());
        assert_eq!(registry.state(id).await, Some(BreakerState::Open));
    }
}
