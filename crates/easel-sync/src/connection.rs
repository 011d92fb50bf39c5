//! Per-client connection handle.
//!
//! A [`ClientConnection`] is what the sync layer holds for one connected
//! client: a bounded channel into the transport's write task, heartbeat
//! state, and an overflow counter. Which sessions the connection belongs to
//! lives in the [`SessionRegistry`](crate::registry::SessionRegistry), not
//! here, since one socket can draw in several rooms at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use easel_core::{ConnectionId, ServerFrame};

/// Liveness state driven by the ping/pong cycle.
struct Heartbeat {
    /// Cleared by [`ClientConnection::check_alive`], set again by any pong.
    responsive: bool,
    last_seen: Instant,
}

/// One connected client, shareable across the bus and transport tasks.
pub struct ClientConnection {
    /// Server-minted id, shared with the registry and the logs.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    opened_at: Instant,
    heartbeat: Mutex<Heartbeat>,
    dropped: AtomicU64,
}

impl ClientConnection {
    /// Wrap a transport send channel. The connection starts out responsive.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            opened_at: Instant::now(),
            heartbeat: Mutex::new(Heartbeat {
                responsive: true,
                last_seen: Instant::now(),
            }),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a text message for the client without blocking.
    ///
    /// A full queue means the client is not keeping up; the message is
    /// dropped and counted rather than stalling the sender.
    pub fn send(&self, text: Arc<String>) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Serialize a frame and queue it.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// How many messages overflowed this connection's queue so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record a pong (or equivalent activity) from the client.
    pub fn mark_alive(&self) {
        let mut hb = self.heartbeat.lock();
        hb.responsive = true;
        hb.last_seen = Instant::now();
    }

    /// Take and clear the responsive flag.
    ///
    /// The heartbeat ticker calls this once per interval; `false` means no
    /// pong arrived since the previous tick.
    pub fn check_alive(&self) -> bool {
        let mut hb = self.heartbeat.lock();
        std::mem::replace(&mut hb.responsive, false)
    }

    /// Time since the client last answered a ping.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.heartbeat.lock().last_seen.elapsed()
    }

    /// How long this connection has been open.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
