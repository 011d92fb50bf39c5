//! Relay bridge: re-broadcasts frames published by peer instances to local
//! session members.
//!
//! The bridge owns one watcher task per watched session. Each watcher
//! consumes the session's relay topic, drops envelopes this instance
//! published itself, and hands the rest to the bus for local-only fan-out.
//! Watchers follow the session lifecycle: the first local join starts one,
//! and the last leave tears it down and releases the topic.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use easel_core::SessionId;

use crate::bus::FanoutBus;
use crate::relay::{Relay, RelayEnvelope};

/// Per-session relay topic watchers.
pub struct RelayBridge {
    relay: Arc<dyn Relay>,
    bus: Arc<FanoutBus>,
    watchers: Mutex<HashMap<SessionId, JoinHandle<()>>>,
}

impl RelayBridge {
    /// Create a bridge over the given relay and bus.
    pub fn new(relay: Arc<dyn Relay>, bus: Arc<FanoutBus>) -> Self {
        Self {
            relay,
            bus,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching a session's relay topic. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, session_id: &SessionId) {
        let mut watchers = self.watchers.lock();
        if watchers.contains_key(session_id) {
            return;
        }
        let rx = self.relay.subscribe(session_id);
        let handle = tokio::spawn(run_watcher(
            session_id.clone(),
            rx,
            Arc::clone(&self.bus),
        ));
        let _ = watchers.insert(session_id.clone(), handle);
        debug!(session_id = %session_id, "watching relay topic");
    }

    /// Stop watching a session's relay topic and release it.
    ///
    /// Unknown sessions are a no-op.
    pub fn unwatch(&self, session_id: &SessionId) {
        let handle = self.watchers.lock().remove(session_id);
        if let Some(handle) = handle {
            handle.abort();
            self.relay.release(session_id);
            debug!(session_id = %session_id, "released relay topic");
        }
    }

    /// Number of sessions currently watched.
    pub fn watched_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Abort all watcher tasks. Called on shutdown.
    pub fn shutdown(&self) {
        let mut watchers = self.watchers.lock();
        for (_, handle) in watchers.drain() {
            handle.abort();
        }
    }
}

async fn run_watcher(
    session_id: SessionId,
    mut rx: broadcast::Receiver<Arc<String>>,
    bus: Arc<FanoutBus>,
) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                let envelope: RelayEnvelope = match serde_json::from_str(&message) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "discarding malformed relay envelope");
                        continue;
                    }
                };
                if envelope.origin == bus.instance_id() {
                    // Our own publication coming back around
                    continue;
                }
                debug!(
                    session_id = %session_id,
                    origin = %envelope.origin,
                    "re-broadcasting frame from peer instance"
                );
                bus.broadcast_local(&session_id, &envelope.frame, None);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(session_id = %session_id, lagged = n, "relay watcher lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!(session_id = %session_id, "relay topic closed, watcher exiting");
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
