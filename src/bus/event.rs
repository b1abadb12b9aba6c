//! Payloads fanned out over the live event bus (spec.md §4.6): the four
//! kinds a subscriber can receive — a recorded check, the refreshed
//! statistics that follow it, an operator notice, and a chunked snapshot
//! in reply to `requestFullUpdate`.

use uuid::Uuid;

use crate::store::{UptimeCheck, UptimeStatistics};

/// Severity of a [`Event::SystemStatus`] notice (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatusLevel {
    Info,
    Warning,
    Error,
}

/// One message broadcast to subscribers of a room.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new check was recorded for an endpoint.
    NewCheck {
        endpoint_id: Uuid,
        check: Box<UptimeCheck>,
    },
    /// Refreshed rolling statistics for one endpoint, published
    /// immediately after the `NewCheck` that caused them.
    UptimeUpdate(Box<UptimeStatistics>),
    /// An operator-facing notice with no single endpoint home — delivered
    /// to the global room only.
    SystemStatus {
        message: String,
        level: SystemStatusLevel,
    },
    /// A chunked reply to `requestFullUpdate`: one page of the full
    /// statistics snapshot.
    BulkUpdate(Vec<UptimeStatistics>),
}

impl Event {
    /// The room this event belongs to, beyond the always-subscribed global
    /// room — `None` for events with no natural per-endpoint home.
    pub fn endpoint_room(&self) -> Option<Uuid> {
        match self {
            Event::NewCheck { endpoint_id, .. } => Some(*endpoint_id),
            Event::UptimeUpdate(stats) => Some(stats.endpoint_id),
            Event::SystemStatus { .. } | Event::BulkUpdate(_) => None,
        }
    }
}
