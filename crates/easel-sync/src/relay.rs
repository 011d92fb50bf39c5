//! Cross-process fan-out seam.
//!
//! Multiple server instances behind a load balancer share sessions through a
//! publish/subscribe topic per session (`session:<session_id>`). [`Relay`] is
//! the seam; [`MemoryRelay`] is the single-process implementation over tokio
//! broadcast channels. A broker-backed implementation (e.g. Redis) slots in
//! behind the same trait in a scaled deployment.
//!
//! Published messages are [`RelayEnvelope`]s tagged with the publishing
//! instance's id, so an instance can discard its own publications instead of
//! re-delivering them (no echo loop). No total order exists across instances;
//! only each instance's local deliveries stay ordered.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use easel_core::{ServerFrame, SessionId};

/// Errors surfaced by relay publication.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The underlying channel or broker rejected the publish.
    #[error("relay publish failed: {0}")]
    Publish(String),
}

/// Message wrapper carried on relay topics.
///
/// `origin` is the publishing instance's id. Subscribers drop envelopes whose
/// origin matches their own instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    /// Publishing instance id.
    pub origin: String,
    /// The frame to re-broadcast locally.
    pub frame: ServerFrame,
}

/// Topic name for a session.
#[must_use]
pub fn topic_name(session_id: &SessionId) -> String {
    format!("session:{session_id}")
}

/// Session-scoped publish/subscribe channel between server instances.
pub trait Relay: Send + Sync {
    /// Publish a serialized envelope to the session topic.
    ///
    /// Returns the number of subscribers that received it. Zero subscribers
    /// is not an error.
    fn publish(&self, session_id: &SessionId, message: Arc<String>) -> Result<usize, RelayError>;

    /// Subscribe to the session topic.
    fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<Arc<String>>;

    /// Drop the topic once no local watcher needs it.
    fn release(&self, _session_id: &SessionId) {}
}

/// In-process relay over per-topic tokio broadcast channels.
pub struct MemoryRelay {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<Arc<String>>>>,
}

impl MemoryRelay {
    /// Create a relay whose topics buffer up to `capacity` messages per
    /// subscriber before lagging subscribers start losing messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live topics.
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    fn get_or_create(&self, topic: &str) -> broadcast::Sender<Arc<String>> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Relay for MemoryRelay {
    fn publish(&self, session_id: &SessionId, message: Arc<String>) -> Result<usize, RelayError> {
        let topic = topic_name(session_id);
        // No topic means no subscribers anywhere; don't create one just to
        // drop the message.
        let Some(sender) = self.topics.read().get(&topic).cloned() else {
            return Ok(0);
        };
        Ok(sender.send(message).unwrap_or(0))
    }

    fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<Arc<String>> {
        self.get_or_create(&topic_name(session_id)).subscribe()
    }

    fn release(&self, session_id: &SessionId) {
        let mut topics = self.topics.write();
        let _ = topics.remove(&topic_name(session_id));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
