//! One probe loop per endpoint.
//!
//! Grounded on the teacher's `actors::service_monitor::ServiceMonitorActor`
//! / `ServiceHandle` pair: an actor owning a command `mpsc::Receiver` and
//! running a `tokio::select!` loop against an interval timer, paired with
//! a cloneable handle that talks to it over oneshot-backed commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::breaker::BreakerRegistry;
use crate::bus::event::SystemStatusLevel;
use crate::bus::{Event, EventBus};
use crate::prober::Prober;
use crate::stats;
use crate::store::{CheckStatus, NewUptimeCheck, Store};

use super::{FailureCounters, RECENT_CHECKS_LIMIT, STATISTICS_WINDOW};

enum Command {
    CheckNow,
    UpdateInterval(Duration),
    Shutdown(oneshot::Sender<()>),
}

/// A cloneable reference to a running [`EndpointAgent`].
#[derive(Clone)]
pub struct AgentHandle {
    endpoint_id: Uuid,
    commands: mpsc::Sender<Command>,
}

impl AgentHandle {
    pub fn endpoint_id(&self) -> Uuid {
        self.endpoint_id
    }

    /// Trigger an out-of-band probe immediately, without resetting the
    /// regular interval timer.
    pub async fn check_now(&self) {
        let _ = self.commands.send(Command::CheckNow).await;
    }

    /// Change the ticking interval in place (endpoint's `checkInterval`
    /// was updated).
    pub async fn update_interval(&self, interval: Duration) {
        let _ = self.commands.send(Command::UpdateInterval(interval)).await;
    }

    /// Stop the loop and wait for it to actually exit.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// Spawn a new probe loop for `endpoint_id`, returning a handle to it and
/// the tokio task itself (kept by the caller so it can be aborted/joined).
pub fn spawn(
    endpoint_id: Uuid,
    initial_interval: Duration,
    store: Store,
    bus: Arc<EventBus>,
    breakers: Arc<BreakerRegistry>,
    prober: Prober,
    failures: Arc<FailureCounters>,
) -> (AgentHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(32);
    let handle = AgentHandle {
        endpoint_id,
        commands: tx,
    };

    let task = tokio::spawn(run(
        endpoint_id,
        initial_interval,
        rx,
        store,
        bus,
        breakers,
        prober,
        failures,
    ));

    (handle, task)
}

#[allow(clippy::too_many_arguments)]
async fn run(
    endpoint_id: Uuid,
    mut interval_duration: Duration,
    mut commands: mpsc::Receiver<Command>,
    store: Store,
    bus: Arc<EventBus>,
    breakers: Arc<BreakerRegistry>,
    prober: Prober,
    failures: Arc<FailureCounters>,
) {
    let mut ticker = tokio::time::interval(interval_duration);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick(endpoint_id, &store, &bus, &breakers, &prober, &failures).await;
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::CheckNow) => {
                        tick(endpoint_id, &store, &bus, &breakers, &prober, &failures).await;
                    }
                    Some(Command::UpdateInterval(new_interval)) => {
                        interval_duration = new_interval;
                        ticker = tokio::time::interval(interval_duration);
                        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                        debug!(endpoint = %endpoint_id, ?new_interval, "probe interval updated");
                    }
                    Some(Command::Shutdown(ack)) => {
                        info!(endpoint = %endpoint_id, "probe loop shutting down");
                        let _ = ack.send(());
                        return;
                    }
                    None => return,
                }
            }
        }
    }
}

/// Recompute and publish `uptimeUpdate` for `endpoint_id`, immediately
/// after a `newCheck` for the same probe (spec.md §4.5/§4.6, P3).
async fn publish_uptime_update(store: &Store, bus: &EventBus, failures: &FailureCounters, endpoint_id: Uuid) {
    let since = Utc::now() - STATISTICS_WINDOW;
    let window = match store.checks_since(endpoint_id, since).await {
        Ok(window) => window,
        Err(err) => {
            warn!(error = %err, "failed to load 24h window for uptime update");
            return;
        }
    };
    let recent = match store.recent_checks(endpoint_id, RECENT_CHECKS_LIMIT).await {
        Ok(recent) => recent,
        Err(err) => {
            warn!(error = %err, "failed to load recent checks for uptime update");
            return;
        }
    };
    let consecutive_failures = failures.get(endpoint_id).await;
    let statistics = stats::compute(endpoint_id, &window, &recent, consecutive_failures);
    bus.publish_event(Event::UptimeUpdate(Box::new(statistics))).await;
}

#[instrument(skip(store, bus, breakers, prober, failures))]
async fn tick(
    endpoint_id: Uuid,
    store: &Store,
    bus: &EventBus,
    breakers: &BreakerRegistry,
    prober: &Prober,
    failures: &FailureCounters,
) {
    let endpoint = match store.get_endpoint(endpoint_id).await {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => {
            warn!("endpoint disappeared from the store; skipping tick");
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to load endpoint for probe");
            return;
        }
    };

    let now = Utc::now();
    if breakers.try_acquire(endpoint_id, now).await.is_err() {
        debug!("circuit open, skipping probe");
        // Short-circuits still produce a DOWN row (spec.md §4.2, §4.4 step
        // 5, P5) but never touch `consecutiveFailures` — they observe the
        // breaker, not the target.
        let rejected = NewUptimeCheck {
            endpoint_id,
            endpoint_name: endpoint.name.clone(),
            status: CheckStatus::Down,
            status_code: 0,
            response_time: 0.0,
            error_reason: Some("Circuit breaker open".to_string()),
        };
        match store.insert_check(rejected).await {
            Ok(check) => {
                bus.publish_event(Event::NewCheck {
                    endpoint_id,
                    check: Box::new(check),
                })
                .await;
                publish_uptime_update(store, bus, failures, endpoint_id).await;
            }
            Err(err) => warn!(error = %err, "failed to persist short-circuited check"),
        }
        return;
    }

    let outcome = prober.probe(&endpoint).await;

    let new_check = NewUptimeCheck {
        endpoint_id,
        endpoint_name: endpoint.name.clone(),
        status: if outcome.success {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        },
        status_code: outcome.status_code,
        response_time: outcome.response_time_ms,
        error_reason: outcome.error_reason.clone(),
    };

    let check = match store.insert_check(new_check).await {
        Ok(check) => check,
        Err(err) => {
            warn!(error = %err, "failed to persist check");
            return;
        }
    };

    bus.publish_event(Event::NewCheck {
        endpoint_id,
        check: Box::new(check),
    })
    .await;

    // Consecutive-failure hooks (spec.md §4.4 step 6) — must land before
    // `publish_uptime_update` so the emitted `uptimeUpdate` carries this
    // probe's own count, not the prior one.
    let notice = if outcome.success {
        let prior_streak = failures.record_up(endpoint_id).await;
        (prior_streak > 0).then(|| {
            (
                format!("{} is back online after {prior_streak} failures", endpoint.name),
                SystemStatusLevel::Info,
            )
        })
    } else {
        let streak = failures.record_down(endpoint_id).await;
        (streak % 3 == 0).then(|| {
            (
                format!("{} has {streak} consecutive failures", endpoint.name),
                SystemStatusLevel::Error,
            )
        })
    };

    publish_uptime_update(store, bus, failures, endpoint_id).await;

    if let Some((message, level)) = notice {
        bus.publish_event(Event::SystemStatus { message, level }).await;
    }

    if let Some(transition) = breakers.record(endpoint_id, now, outcome.success).await {
        info!(?transition.old_state, ?transition.new_state, "breaker transitioned");
    }
}
