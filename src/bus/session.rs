//! A single subscriber's mailbox and room membership.
//!
//! Grounded on `sblanchard-SerialAgent`'s `nodes::registry::ConnectedNode`:
//! a registry entry holding an `mpsc::Sender` sink plus a `last_seen`
//! timestamp, looked up by id rather than held directly by the caller.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use super::event::Event;

/// Outbound channel capacity per session before `publish` starts dropping
/// messages to that session rather than blocking the whole room.
pub const SESSION_MAILBOX_SIZE: usize = 256;

pub struct Session {
    pub id: Uuid,
    pub sender: mpsc::Sender<Event>,
    pub rooms: HashSet<String>,
    pub last_seen: Instant,
}

impl Session {
    pub fn new(id: Uuid) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(SESSION_MAILBOX_SIZE);
        (
            Self {
                id,
                sender,
                rooms: HashSet::new(),
                last_seen: Instant::now(),
            },
            receiver,
        )
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_seen)
    }
}
