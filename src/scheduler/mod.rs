//! The scheduler (spec.md §4.5): keeps one running probe loop per enabled
//! endpoint and exposes the operator-facing CRUD surface that drives it.
//!
//! Grounded on the teacher's `bin/hub.rs`, which owns a map of per-server
//! actor handles and wires them to shared storage/broadcast state at
//! startup; generalized here so endpoints can be added, updated, and
//! removed at runtime rather than only at process start.

pub mod agent;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::breaker::{BreakerConfig, BreakerRegistry};
use crate::bus::event::SystemStatusLevel;
use crate::bus::{Event, EventBus};
use crate::config::WatchtowerConfig;
use crate::error::{WatchtowerError, WatchtowerResult};
use crate::prober::Prober;
use crate::retention::RetentionJob;
use crate::stats;
use crate::store::{Endpoint, EndpointUpdate, NewEndpoint, Store, UptimeStatistics};

use agent::{AgentHandle, spawn};

/// How far back [`Engine::get_uptime_statistics`] looks for the rolling
/// window (spec.md §3, "UptimeStatistics").
const STATISTICS_WINDOW: chrono::Duration = chrono::Duration::hours(24);

/// How many of the most recent checks feed `recentChecks`.
const RECENT_CHECKS_LIMIT: i64 = 10;

struct RunningAgent {
    handle: AgentHandle,
    task: JoinHandle<()>,
}

/// The scheduler's live per-endpoint `consecutiveFailures` counters
/// (spec.md §3, §4.4 step 6). Owned by `Engine`, shared with each probe
/// loop so `stats::compute` never has to re-derive the count from
/// `recentChecks` — which would double-count a short-circuited
/// breaker-open check once it starts being persisted as a DOWN row.
#[derive(Default)]
pub(crate) struct FailureCounters {
    counts: RwLock<HashMap<Uuid, u32>>,
}

impl FailureCounters {
    fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn get(&self, endpoint_id: Uuid) -> u32 {
        self.counts.read().await.get(&endpoint_id).copied().unwrap_or(0)
    }

    /// Record a DOWN outcome, returning the streak length it just reached.
    pub(crate) async fn record_down(&self, endpoint_id: Uuid) -> u32 {
        let mut counts = self.counts.write().await;
        let entry = counts.entry(endpoint_id).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Record an UP outcome, resetting the streak to 0 and returning the
    /// streak length that just ended (0 if already healthy).
    pub(crate) async fn record_up(&self, endpoint_id: Uuid) -> u32 {
        self.counts.write().await.insert(endpoint_id, 0).unwrap_or(0)
    }

    async fn remove(&self, endpoint_id: Uuid) {
        self.counts.write().await.remove(&endpoint_id);
    }

    async fn clear(&self) {
        self.counts.write().await.clear();
    }
}

/// Owns the store, the circuit breaker registry, the event bus, the
/// retention job, and one running probe loop per enabled endpoint. This is
/// the explicit entry point spec.md §9 calls for in place of auto-starting
/// loops as a side effect of endpoint creation.
pub struct Engine {
    store: Store,
    bus: Arc<EventBus>,
    breakers: Arc<BreakerRegistry>,
    prober: Prober,
    config: WatchtowerConfig,
    agents: RwLock<HashMap<Uuid, RunningAgent>>,
    failures: Arc<FailureCounters>,
    retention: Arc<RetentionJob>,
    retention_task: RwLock<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Connect to the store and build an idle engine. Call [`Engine::start`]
    /// to spawn loops for every currently-enabled endpoint.
    pub async fn connect(config: WatchtowerConfig) -> WatchtowerResult<Self> {
        let store = Store::connect(&config.database_url).await?;
        let retention = RetentionJob::new(store.clone(), config.retention);
        Ok(Self {
            store,
            bus: Arc::new(EventBus::new(config.bus)),
            breakers: Arc::new(BreakerRegistry::new()),
            prober: Prober::new(),
            config,
            agents: RwLock::new(HashMap::new()),
            failures: Arc::new(FailureCounters::new()),
            retention,
            retention_task: RwLock::new(None),
        })
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Spawn a probe loop for every enabled endpoint already in the store,
    /// plus the daily retention timer.
    pub async fn start(&self) -> WatchtowerResult<()> {
        let endpoints = self.store.list_enabled_endpoints().await?;
        info!(count = endpoints.len(), "starting probe loops");
        if endpoints.is_empty() {
            self.bus
                .publish_event(Event::SystemStatus {
                    message: "Monitoring started with no enabled endpoints".to_string(),
                    level: SystemStatusLevel::Warning,
                })
                .await;
        } else {
            self.bus
                .publish_event(Event::SystemStatus {
                    message: format!("Monitoring started for {} endpoints", endpoints.len()),
                    level: SystemStatusLevel::Info,
                })
                .await;
        }
        for endpoint in endpoints {
            self.spawn_agent(&endpoint).await;
        }
        *self.retention_task.write().await = Some(Arc::clone(&self.retention).spawn());
        Ok(())
    }

    /// Stop every running probe loop and the retention timer, waiting for
    /// each probe loop to acknowledge, and clear the live
    /// `consecutiveFailures` cache.
    pub async fn stop(&self) {
        if let Some(task) = self.retention_task.write().await.take() {
            task.abort();
        }
        let mut agents = self.agents.write().await;
        for (_, running) in agents.drain() {
            running.handle.shutdown().await;
            let _ = running.task.await;
        }
        drop(agents);
        self.failures.clear().await;
        self.bus
            .publish_event(Event::SystemStatus {
                message: "Monitoring engine stopped".to_string(),
                level: SystemStatusLevel::Info,
            })
            .await;
    }

    /// Alias for [`Engine::stop`], named for the graceful-shutdown call
    /// site in `bin/hub.rs`.
    pub async fn shutdown(&self) {
        self.stop().await;
    }

    /// Run one retention pass immediately, out of band from its daily
    /// timer (operator-triggered roll-up/prune).
    pub async fn trigger_retention(&self) -> WatchtowerResult<()> {
        self.retention.run_once().await?;
        Ok(())
    }

    async fn spawn_agent(&self, endpoint: &Endpoint) {
        self.breakers
            .register(
                endpoint.id,
                BreakerConfig::for_endpoint(&self.config.breaker, endpoint.check_interval),
            )
            .await;

        let (handle, task) = spawn(
            endpoint.id,
            Duration::from_secs(endpoint.check_interval.max(1) as u64),
            self.store.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.breakers),
            self.prober.clone(),
            Arc::clone(&self.failures),
        );

        self.agents
            .write()
            .await
            .insert(endpoint.id, RunningAgent { handle, task });
    }

    async fn stop_agent(&self, endpoint_id: Uuid) {
        if let Some(running) = self.agents.write().await.remove(&endpoint_id) {
            running.handle.shutdown().await;
            let _ = running.task.await;
        }
        self.breakers.remove(endpoint_id).await;
        self.failures.remove(endpoint_id).await;
    }

    /// Validate, persist, and — if `enabled` — start probing a new
    /// endpoint.
    pub async fn add_endpoint(&self, new: NewEndpoint) -> WatchtowerResult<Endpoint> {
        new.validate()?;
        let enabled = new.enabled;
        let endpoint = self.store.create_endpoint(new).await?;
        if enabled {
            self.spawn_agent(&endpoint).await;
        }
        Ok(endpoint)
    }

    /// Apply a sparse update, restarting or stopping the probe loop as the
    /// `enabled`/`checkInterval` fields change.
    pub async fn update_endpoint(
        &self,
        id: Uuid,
        patch: EndpointUpdate,
    ) -> WatchtowerResult<Endpoint> {
        let current = self
            .store
            .get_endpoint(id)
            .await?
            .ok_or(WatchtowerError::NotFound(id))?;
        patch.validate(&current)?;

        let was_enabled = current.enabled;
        let new_interval = patch.check_interval;

        let updated = self
            .store
            .update_endpoint(id, &current, patch)
            .await?
            .ok_or(WatchtowerError::NotFound(id))?;

        match (was_enabled, updated.enabled) {
            (true, false) => self.stop_agent(id).await,
            (false, true) => self.spawn_agent(&updated).await,
            (true, true) if new_interval.is_some() => {
                if let Some(running) = self.agents.read().await.get(&id) {
                    running
                        .handle
                        .update_interval(Duration::from_secs(updated.check_interval.max(1) as u64))
                        .await;
                }
            }
            _ => {}
        }

        Ok(updated)
    }

    /// Stop probing and remove an endpoint, cascading to its checks and
    /// aggregates in the store.
    pub async fn remove_endpoint(&self, id: Uuid) -> WatchtowerResult<()> {
        self.stop_agent(id).await;
        let removed = self.store.delete_endpoint(id).await?;
        if !removed {
            return Err(WatchtowerError::NotFound(id));
        }
        Ok(())
    }

    /// Trigger an immediate probe of an already-enabled endpoint.
    pub async fn check_now(&self, id: Uuid) -> WatchtowerResult<()> {
        match self.agents.read().await.get(&id) {
            Some(running) => {
                running.handle.check_now().await;
                Ok(())
            }
            None => Err(WatchtowerError::NotFound(id)),
        }
    }

    /// Stop and immediately respawn an endpoint's probe loop (useful after
    /// a breaker gets stuck or the process needs to reset in-flight
    /// state).
    pub async fn restart_endpoint(&self, id: Uuid) -> WatchtowerResult<()> {
        let endpoint = self
            .store
            .get_endpoint(id)
            .await?
            .ok_or(WatchtowerError::NotFound(id))?;
        if !endpoint.enabled {
            warn!(endpoint = %id, "restart requested for a disabled endpoint");
            return Ok(());
        }
        self.stop_agent(id).await;
        self.spawn_agent(&endpoint).await;
        Ok(())
    }

    pub async fn get_endpoint(&self, id: Uuid) -> WatchtowerResult<Endpoint> {
        self.store
            .get_endpoint(id)
            .await?
            .ok_or(WatchtowerError::NotFound(id))
    }

    pub async fn list_endpoints(&self) -> WatchtowerResult<Vec<Endpoint>> {
        Ok(self.store.list_endpoints().await?)
    }

    pub async fn list_enabled_endpoints(&self) -> WatchtowerResult<Vec<Endpoint>> {
        Ok(self.store.list_enabled_endpoints().await?)
    }

    /// Flip an endpoint's `enabled` flag, starting or stopping its probe
    /// loop accordingly.
    pub async fn toggle_endpoint(&self, id: Uuid, enabled: bool) -> WatchtowerResult<Endpoint> {
        self.update_endpoint(
            id,
            EndpointUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    /// Compute the rolling 24h statistics for one endpoint (spec.md §4.3).
    pub async fn get_uptime_statistics(&self, id: Uuid) -> WatchtowerResult<UptimeStatistics> {
        self.get_endpoint(id).await?;
        let since = Utc::now() - STATISTICS_WINDOW;
        let window = self.store.checks_since(id, since).await?;
        let recent = self.store.recent_checks(id, RECENT_CHECKS_LIMIT).await?;
        let consecutive_failures = self.failures.get(id).await;
        Ok(stats::compute(id, &window, &recent, consecutive_failures))
    }

    /// Compute rolling statistics for every endpoint, enabled or not.
    pub async fn get_all_uptime_statuses(&self) -> WatchtowerResult<Vec<UptimeStatistics>> {
        let endpoints = self.store.list_endpoints().await?;
        let mut statuses = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            statuses.push(self.get_uptime_statistics(endpoint.id).await?);
        }
        Ok(statuses)
    }
}
