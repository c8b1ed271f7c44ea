//! Per-conversation room state and event fan-out.
//!
//! A [`RoomRegistry`] is the single shared, mutable source of truth the
//! agents consult every cycle: which conversations have live connections,
//! whether they are paused, how fast they should move, and which thinkers
//! are currently typing. It is also the broadcast point: every outbound
//! [`RoomEvent`] flows through [`RoomRegistry::broadcast`].
//!
//! Activity is always derived, never set: a conversation is active iff its
//! connection set is non-empty. That one fact is the system's primary
//! backpressure mechanism: no LLM call happens while nobody is watching.
//!
//! All registry state lives behind a single `tokio::sync::Mutex`; it is the
//! only lock in the crate. Mutations are atomic with respect to agent
//! interleaving, and broadcasts go out while the lock is held (sends are
//! non-blocking channel pushes, so nothing awaits under the lock).
//!
//! The pause flag is deliberately *not* part of the per-room entry: it
//! lives in a registry-level set that survives every client disconnecting
//! and the agent set being stopped and restarted. A user who pauses a
//! conversation and walks away finds it still paused when they return.

use crate::agora::event::RoomEvent;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Speed multiplier bounds. Higher is slower; 6x is a very contemplative
/// pace.
pub const MIN_SPEED_MULTIPLIER: f64 = 0.5;
pub const MAX_SPEED_MULTIPLIER: f64 = 6.0;

/// A live client connection to one conversation's room.
///
/// Dropping the receiver (or the whole struct) is how a transport gateway
/// abandons a connection; the next broadcast silently evicts it.
pub struct Connection {
    /// Registry-assigned connection identifier.
    pub id: String,
    /// The conversation this connection is attached to.
    pub conversation_id: String,
    /// Outbound event stream for this client.
    pub events: UnboundedReceiver<RoomEvent>,
}

/// Mutable runtime state for one conversation's room.
struct RoomState {
    senders: HashMap<String, UnboundedSender<RoomEvent>>,
    typing_thinkers: HashSet<String>,
    speed_multiplier: f64,
}

impl RoomState {
    fn new() -> Self {
        RoomState {
            senders: HashMap::new(),
            typing_thinkers: HashSet::new(),
            speed_multiplier: 1.0,
        }
    }
}

struct RegistryInner {
    rooms: HashMap<String, RoomState>,
    paused: HashSet<String>,
}

impl RegistryInner {
    /// Deliver an event to every connection in a room, evicting any
    /// connection that no longer accepts delivery. Never fails.
    fn broadcast(&mut self, conversation_id: &str, event: &RoomEvent) {
        let room = match self.rooms.get_mut(conversation_id) {
            Some(room) => room,
            None => return,
        };
        let mut dropped: Vec<String> = Vec::new();
        for (id, sender) in &room.senders {
            if sender.send(event.clone()).is_err() {
                dropped.push(id.clone());
            }
        }
        for id in dropped {
            room.senders.remove(&id);
        }
    }
}

/// Registry of all live rooms, shared between the orchestrator, the agents,
/// and the transport gateway.
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            inner: Mutex::new(RegistryInner {
                rooms: HashMap::new(),
                paused: HashSet::new(),
            }),
        }
    }

    /// Attach a new client connection to a conversation, creating the room
    /// lazily. Broadcasts [`RoomEvent::UserJoined`] to the room and, if the
    /// conversation is paused, delivers the current pause state to the new
    /// connection so late joiners see a consistent picture.
    pub async fn connect(&self, conversation_id: &str) -> Connection {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4().to_string();

        let mut inner = self.inner.lock().await;
        let paused = inner.paused.contains(conversation_id);
        if paused {
            // Only the newcomer needs the catch-up event.
            let _ = sender.send(RoomEvent::Paused);
        }
        inner
            .rooms
            .entry(conversation_id.to_string())
            .or_insert_with(RoomState::new)
            .senders
            .insert(id.clone(), sender);
        inner.broadcast(conversation_id, &RoomEvent::UserJoined);

        Connection {
            id,
            conversation_id: conversation_id.to_string(),
            events: receiver,
        }
    }

    /// Detach a connection. Broadcasts [`RoomEvent::UserLeft`] to whoever
    /// remains; when the last connection leaves, the typing set is cleared
    /// (the room entry itself survives until [`RoomRegistry::discard`]).
    pub async fn disconnect(&self, conversation_id: &str, connection_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.rooms.get_mut(conversation_id) {
            room.senders.remove(connection_id);
            if room.senders.is_empty() {
                room.typing_thinkers.clear();
            }
        }
        inner.broadcast(conversation_id, &RoomEvent::UserLeft);
    }

    /// Whether any client is connected. The one fact agents poll before
    /// doing any work.
    pub async fn is_active(&self, conversation_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(conversation_id)
            .map(|room| !room.senders.is_empty())
            .unwrap_or(false)
    }

    /// Current speed multiplier; 1.0 when the room does not exist.
    pub async fn speed(&self, conversation_id: &str) -> f64 {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(conversation_id)
            .map(|room| room.speed_multiplier)
            .unwrap_or(1.0)
    }

    /// Clamp and apply a new speed multiplier, then notify every client.
    pub async fn set_speed(&self, conversation_id: &str, multiplier: f64) {
        let clamped = multiplier.clamp(MIN_SPEED_MULTIPLIER, MAX_SPEED_MULTIPLIER);
        let mut inner = self.inner.lock().await;
        let applied = match inner.rooms.get_mut(conversation_id) {
            Some(room) => {
                room.speed_multiplier = clamped;
                true
            }
            None => false,
        };
        if applied {
            inner.broadcast(
                conversation_id,
                &RoomEvent::SpeedChanged { multiplier: clamped },
            );
        }
    }

    /// Pause a conversation and notify every client. Pause state outlives
    /// both disconnections and agent restarts; only [`RoomRegistry::resume`]
    /// clears it.
    pub async fn pause(&self, conversation_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.paused.insert(conversation_id.to_string());
        inner.broadcast(conversation_id, &RoomEvent::Paused);
    }

    /// Resume a paused conversation and notify every client.
    pub async fn resume(&self, conversation_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.paused.remove(conversation_id);
        inner.broadcast(conversation_id, &RoomEvent::Resumed);
    }

    pub async fn is_paused(&self, conversation_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.paused.contains(conversation_id)
    }

    /// Mark a thinker as typing and notify clients. The set mutation is
    /// idempotent; the notification is not deduplicated.
    pub async fn typing_started(&self, conversation_id: &str, thinker: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.rooms.get_mut(conversation_id) {
            room.typing_thinkers.insert(thinker.to_string());
        }
        inner.broadcast(
            conversation_id,
            &RoomEvent::ThinkerTyping {
                thinker: thinker.to_string(),
            },
        );
    }

    /// Clear a thinker's typing state and notify clients. Safe to call when
    /// the thinker was not typing.
    pub async fn typing_stopped(&self, conversation_id: &str, thinker: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.rooms.get_mut(conversation_id) {
            room.typing_thinkers.remove(thinker);
        }
        inner.broadcast(
            conversation_id,
            &RoomEvent::ThinkerStoppedTyping {
                thinker: thinker.to_string(),
            },
        );
    }

    /// Names of thinkers currently typing, sorted for stable output.
    pub async fn typing_thinkers(&self, conversation_id: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<String> = inner
            .rooms
            .get(conversation_id)
            .map(|room| room.typing_thinkers.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Deliver an event to every connection in a room. Connections that
    /// fail to accept delivery are evicted; the call itself never fails.
    pub async fn broadcast(&self, conversation_id: &str, event: RoomEvent) {
        let mut inner = self.inner.lock().await;
        inner.broadcast(conversation_id, &event);
    }

    /// Drop a conversation's room entry entirely: connections, typing set
    /// and speed. Called when agents are explicitly stopped. Pause state is
    /// intentionally left in place.
    pub async fn discard(&self, conversation_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.rooms.remove(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn activity_follows_connection_count() {
        let registry = RoomRegistry::new();
        assert!(!registry.is_active("c1").await);

        let conn = registry.connect("c1").await;
        assert!(registry.is_active("c1").await);

        registry.disconnect("c1", &conn.id).await;
        assert!(!registry.is_active("c1").await);
    }

    #[tokio::test]
    async fn speed_is_clamped_both_ways() {
        let registry = RoomRegistry::new();
        let _conn = registry.connect("c1").await;

        registry.set_speed("c1", 0.1).await;
        assert!((registry.speed("c1").await - MIN_SPEED_MULTIPLIER).abs() < 1e-9);

        registry.set_speed("c1", 99.0).await;
        assert!((registry.speed("c1").await - MAX_SPEED_MULTIPLIER).abs() < 1e-9);
    }

    #[tokio::test]
    async fn typing_state_is_idempotent_but_notifications_are_not() {
        let registry = RoomRegistry::new();
        let mut conn = registry.connect("c1").await;
        // Drain the join event.
        let _ = conn.events.recv().await;

        registry.typing_started("c1", "Kant").await;
        registry.typing_started("c1", "Kant").await;

        assert_eq!(registry.typing_thinkers("c1").await, vec!["Kant"]);

        let mut typing_events = 0;
        while let Ok(event) = conn.events.try_recv() {
            if matches!(event, RoomEvent::ThinkerTyping { .. }) {
                typing_events += 1;
            }
        }
        assert_eq!(typing_events, 2);
    }

    #[tokio::test]
    async fn broadcast_evicts_dead_connections() {
        let registry = RoomRegistry::new();
        let conn = registry.connect("c1").await;
        drop(conn.events); // client went away without disconnecting

        // Must not error; the dead connection is removed.
        registry.broadcast("c1", RoomEvent::UserJoined).await;
        assert!(!registry.is_active("c1").await);
    }

    #[tokio::test]
    async fn pause_survives_reconnect_and_discard() {
        let registry = RoomRegistry::new();
        let conn = registry.connect("c1").await;
        registry.pause("c1").await;
        registry.disconnect("c1", &conn.id).await;
        registry.discard("c1").await;

        assert!(registry.is_paused("c1").await);

        // A fresh connection is told about the pause immediately.
        let mut conn = registry.connect("c1").await;
        let first = conn.events.recv().await.unwrap();
        assert!(matches!(first, RoomEvent::Paused));
    }

    #[tokio::test]
    async fn set_speed_without_room_is_a_noop() {
        let registry = RoomRegistry::new();
        registry.set_speed("ghost", 3.0).await;
        assert!((registry.speed("ghost").await - 1.0).abs() < 1e-9);
    }
}
