//! In-memory buffer of operations awaiting durable flush.
//!
//! [`PendingBuffer`] is the only owner of the per-session queues and the dirty
//! signal; appenders and the flush scheduler interact with it solely through
//! [`append`](PendingBuffer::append), [`wait_dirty`](PendingBuffer::wait_dirty),
//! [`drain_all`](PendingBuffer::drain_all) and
//! [`restore`](PendingBuffer::restore). The underlying map is never exposed.
//!
//! The dirty signal is edge-triggered with a stored permit: an append that
//! happens while nobody is waiting leaves the permit set, so the scheduler's
//! next wait returns immediately instead of missing the wakeup.

use std::collections::HashMap;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Notify;

use easel_core::{PendingOp, SessionId};

/// Per-session queues of not-yet-persisted operations.
pub struct PendingBuffer {
    ops: Mutex<HashMap<SessionId, Vec<PendingOp>>>,
    dirty: Notify,
}

impl PendingBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(HashMap::new()),
            dirty: Notify::new(),
        }
    }

    /// Append an operation to a session's queue and raise the dirty signal.
    ///
    /// Queues keep arrival order. The caller-supplied `op_index` inside the
    /// operation is stored untouched, with no monotonicity check or sorting.
    /// Never touches storage, so the real-time path cannot stall here.
    pub fn append(&self, session_id: &SessionId, op: PendingOp) {
        self.ops
            .lock()
            .entry(session_id.clone())
            .or_default()
            .push(op);
        counter!("ops_buffered_total").increment(1);
        self.dirty.notify_one();
    }

    /// Wait until the buffer is dirty.
    ///
    /// Consumes the stored permit if an append already happened; otherwise
    /// suspends until the next append.
    pub async fn wait_dirty(&self) {
        self.dirty.notified().await;
    }

    /// Atomically swap out and return every non-empty session queue.
    ///
    /// Appends racing with the drain land in the fresh buffer; nothing is
    /// lost and nothing can be handed out twice.
    pub fn drain_all(&self) -> Vec<(SessionId, Vec<PendingOp>)> {
        let drained = {
            let mut guard = self.ops.lock();
            std::mem::take(&mut *guard)
        };
        drained
            .into_iter()
            .filter(|(_, ops)| !ops.is_empty())
            .collect()
    }

    /// Put a drained batch back at the head of a session's queue.
    ///
    /// Used when the durable write for the batch failed: the batch goes in
    /// front of operations that arrived during the failed flush, so arrival
    /// order survives the retry. Does not re-raise the dirty signal; the
    /// periodic sweep picks the batch up, which bounds the retry rate while
    /// the store is down.
    pub fn restore(&self, session_id: &SessionId, mut batch: Vec<PendingOp>) {
        if batch.is_empty() {
            return;
        }
        let mut guard = self.ops.lock();
        let queue = guard.entry(session_id.clone()).or_default();
        batch.append(queue);
        *queue = batch;
    }

    /// Total operations currently buffered across all sessions.
    pub fn pending_count(&self) -> usize {
        self.ops.lock().values().map(Vec::len).sum()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.ops.lock().values().all(Vec::is_empty)
    }
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
