//! Live event bus (spec.md §4.6): a session registry with room-based
//! pub/sub, connection and per-session room caps, idle eviction, and
//! chunked bulk sends.
//!
//! Grounded on `sblanchard-SerialAgent`'s `nodes::registry::NodeRegistry`
//! (an `RwLock<HashMap<..>>` of connected peers keyed by id, each holding
//! an `mpsc::Sender` sink) generalized from a flat peer list to rooms, and
//! on the teacher's `api::websocket` forwarding loop for how a subscriber
//! drains its mailbox.

pub mod event;
pub mod session;

pub use event::Event;
pub use session::Session;

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::BusConfig;
use crate::store::UptimeStatistics;

/// The room every session is subscribed to on connect.
pub const ROOM_GLOBAL: &str = "global";

/// How many session mailboxes `publish` writes to before yielding back to
/// the scheduler, so one huge room doesn't monopolize a task poll. This is
/// fan-out batching over *sessions*, unrelated to how a `bulkUpdate`
/// snapshot itself is paginated — see [`BULK_UPDATE_CHUNK_SIZE`].
const PUBLISH_CHUNK_SIZE: usize = 64;

/// How many `UptimeStatistics` entries one `bulkUpdate` event carries when
/// replying to `requestFullUpdate` (spec.md §4.6).
const BULK_UPDATE_CHUNK_SIZE: usize = 20;

/// Pause between successive `bulkUpdate` chunks of the same snapshot, so a
/// large fleet doesn't arrive as one head-of-line-blocking burst.
const BULK_UPDATE_CHUNK_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("connection limit of {0} reached")]
    TooManyClients(usize),

    #[error("room limit of {0} per session reached")]
    TooManyRooms(usize),
}

/// Endpoint room name, so callers don't hand-format endpoint ids.
pub fn endpoint_room(endpoint_id: Uuid) -> String {
    format!("endpoint:{endpoint_id}")
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<Uuid, Session>,
    rooms: HashMap<String, HashSet<Uuid>>,
}

pub struct EventBus {
    config: BusConfig,
    registry: RwLock<Registry>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Register a new subscriber, auto-joined to [`ROOM_GLOBAL`]. Rejects
    /// the connection once `max_clients` is reached.
    pub async fn connect(&self) -> Result<(Uuid, tokio::sync::mpsc::Receiver<Event>), BusError> {
        let mut registry = self.registry.write().await;
        if registry.sessions.len() >= self.config.max_clients {
            return Err(BusError::TooManyClients(self.config.max_clients));
        }

        let id = Uuid::new_v4();
        let (mut session, receiver) = Session::new(id);
        session.rooms.insert(ROOM_GLOBAL.to_string());
        registry.sessions.insert(id, session);
        registry
            .rooms
            .entry(ROOM_GLOBAL.to_string())
            .or_default()
            .insert(id);

        Ok((id, receiver))
    }

    /// Drop a subscriber and remove it from every room.
    pub async fn disconnect(&self, session_id: Uuid) {
        let mut registry = self.registry.write().await;
        if let Some(session) = registry.sessions.remove(&session_id) {
            for room in session.rooms {
                if let Some(members) = registry.rooms.get_mut(&room) {
                    members.remove(&session_id);
                    if members.is_empty() {
                        registry.rooms.remove(&room);
                    }
                }
            }
        }
    }

    /// Subscribe a session to an additional room (typically
    /// [`endpoint_room`]). Rejects once `max_rooms_per_client` is reached.
    pub async fn join_room(&self, session_id: Uuid, room: &str) -> Result<(), BusError> {
        let mut registry = self.registry.write().await;
        let Some(session) = registry.sessions.get_mut(&session_id) else {
            return Ok(());
        };
        if session.rooms.contains(room) {
            return Ok(());
        }
        if session.rooms.len() >= self.config.max_rooms_per_client {
            return Err(BusError::TooManyRooms(self.config.max_rooms_per_client));
        }
        session.rooms.insert(room.to_string());
        registry
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(session_id);
        Ok(())
    }

    pub async fn leave_room(&self, session_id: Uuid, room: &str) {
        let mut registry = self.registry.write().await;
        if let Some(session) = registry.sessions.get_mut(&session_id) {
            session.rooms.remove(room);
        }
        if let Some(members) = registry.rooms.get_mut(room) {
            members.remove(&session_id);
            if members.is_empty() {
                registry.rooms.remove(room);
            }
        }
    }

    /// Mark a session as active, resetting its idle timer (called whenever
    /// a session's own traffic is observed by the caller's transport).
    pub async fn touch(&self, session_id: Uuid) {
        if let Some(session) = self.registry.write().await.sessions.get_mut(&session_id) {
            session.touch();
        }
    }

    /// Fan `event` out to every session subscribed to `room`, in chunks of
    /// [`PUBLISH_CHUNK_SIZE`] so a huge room doesn't block the caller in
    /// one long critical section. A full or closed mailbox is dropped
    /// silently — a slow subscriber loses events, it never blocks probing.
    pub async fn publish(&self, room: &str, event: Event) {
        let registry = self.registry.read().await;
        let Some(members) = registry.rooms.get(room) else {
            return;
        };
        let ids: Vec<Uuid> = members.iter().copied().collect();
        for chunk in ids.chunks(PUBLISH_CHUNK_SIZE) {
            for id in chunk {
                if let Some(session) = registry.sessions.get(id) {
                    let _ = session.sender.try_send(event.clone());
                }
            }
        }
    }

    /// Publish to [`ROOM_GLOBAL`] and, if the event names one, its
    /// endpoint room.
    pub async fn publish_event(&self, event: Event) {
        self.publish(ROOM_GLOBAL, event.clone()).await;
        if let Some(id) = event.endpoint_room() {
            self.publish(&endpoint_room(id), event).await;
        }
    }

    /// Reply to one session's `requestFullUpdate` with its full statistics
    /// snapshot, split into `bulkUpdate` events of at most
    /// [`BULK_UPDATE_CHUNK_SIZE`] entries each and paced
    /// [`BULK_UPDATE_CHUNK_DELAY`] apart, preserving order. Sent only to
    /// `session_id`, never broadcast to a room.
    pub async fn send_full_update(&self, session_id: Uuid, statuses: Vec<UptimeStatistics>) {
        let sender = {
            let registry = self.registry.read().await;
            match registry.sessions.get(&session_id) {
                Some(session) => session.sender.clone(),
                None => return,
            }
        };

        let mut chunks = statuses.chunks(BULK_UPDATE_CHUNK_SIZE).peekable();
        while let Some(chunk) = chunks.next() {
            let _ = sender.try_send(Event::BulkUpdate(chunk.to_vec()));
            if chunks.peek().is_some() {
                tokio::time::sleep(BULK_UPDATE_CHUNK_DELAY).await;
            }
        }
    }

    /// Evict every session that has been idle longer than
    /// `client_timeout` (spec.md §4.6 idle eviction). Intended to be
    /// driven by a periodic sweeper task.
    pub async fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let timeout: Duration = self.config.client_timeout;
        let stale: Vec<Uuid> = {
            let registry = self.registry.read().await;
            registry
                .sessions
                .values()
                .filter(|s| s.idle_for(now) >= timeout)
                .map(|s| s.id)
                .collect()
        };
        for id in &stale {
            self.disconnect(*id).await;
        }
        stale.len()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn config(max_clients: usize, max_rooms: usize) -> BusConfig {
        BusConfig {
            max_clients,
            max_rooms_per_client: max_rooms,
            client_timeout: StdDuration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn connect_auto_joins_global_room() {
        let bus = EventBus::new(config(10, 10));
        let (id, _rx) = bus.connect().await.unwrap();
        bus.publish_event(Event::SystemStatus {
            message: "hello".to_string(),
            level: event::SystemStatusLevel::Info,
        })
        .await;
        assert_eq!(bus.session_count().await, 1);
        bus.disconnect(id).await;
        assert_eq!(bus.session_count().await, 0);
    }

    #[tokio::test]
    async fn rejects_beyond_max_clients() {
        let bus = EventBus::new(config(1, 10));
        let _first = bus.connect().await.unwrap();
        assert_eq!(bus.connect().await, Err(BusError::TooManyClients(1)));
    }

    #[tokio::test]
    async fn rejects_beyond_max_rooms_per_client() {
        let bus = EventBus::new(config(10, 1));
        let (id, _rx) = bus.connect().await.unwrap();
        let err = bus.join_room(id, &endpoint_room(Uuid::new_v4())).await;
        assert_eq!(err, Err(BusError::TooManyRooms(1)));
    }

    #[tokio::test]
    async fn publish_reaches_only_room_members() {
        let bus = EventBus::new(config(10, 10));
        let (id_a, mut rx_a) = bus.connect().await.unwrap();
        let (_id_b, mut rx_b) = bus.connect().await.unwrap();

        let endpoint_id = Uuid::new_v4();
        bus.join_room(id_a, &endpoint_room(endpoint_id)).await.unwrap();

        bus.publish(
            &endpoint_room(endpoint_id),
            Event::SystemStatus {
                message: "hello".to_string(),
                level: event::SystemStatusLevel::Info,
            },
        )
        .await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_full_update_chunks_and_paces_bulk_updates() {
        let bus = EventBus::new(config(10, 10));
        let (id, mut rx) = bus.connect().await.unwrap();

        let statuses: Vec<UptimeStatistics> = (0..45)
            .map(|_| sample_statistics())
            .collect();
        bus.send_full_update(id, statuses).await;

        let mut received = 0;
        let mut chunks = 0;
        while let Ok(Event::BulkUpdate(chunk)) = rx.try_recv() {
            received += chunk.len();
            chunks += 1;
        }
        assert_eq!(received, 45);
        assert_eq!(chunks, 3);
    }

    fn sample_statistics() -> UptimeStatistics {
        UptimeStatistics {
            endpoint_id: Uuid::new_v4(),
            total_checks: 0,
            up_checks: 0,
            down_checks: 0,
            uptime_percentage: 0.0,
            avg_response_time: 0.0,
            last_check: None,
            current_status: crate::store::CheckStatus::Up,
            recent_checks: vec![],
            consecutive_failures: 0,
        }
    }

    #[tokio::test]
    async fn sweep_idle_evicts_stale_sessions() {
        let bus = EventBus::new(BusConfig {
            max_clients: 10,
            max_rooms_per_client: 10,
            client_timeout: StdDuration::from_millis(1),
        });
        let (_id, _rx) = bus.connect().await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let evicted = bus.sweep_idle().await;
        assert_eq!(evicted, 1);
        assert_eq!(bus.session_count().await, 0);
    }
}
