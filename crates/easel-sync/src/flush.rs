//! Background flush scheduler.
//!
//! One cooperative tokio task owns the drain cycle: it sleeps until the
//! buffer's dirty signal fires or a periodic sweep interval elapses, swaps
//! the buffer out, and writes each session's batch to the store as one
//! transaction. A short cooldown after every cycle bounds flush frequency
//! under bursty load.
//!
//! A batch whose write fails is put back at the head of its session's queue
//! and retried on a later cycle; a failed write never discards operations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use easel_store::OpStore;

use crate::buffer::PendingBuffer;

/// Timing for the flush loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Upper bound on how long the scheduler sleeps before sweeping the
    /// buffer even without a dirty signal (default: 5000).
    pub wake_interval_ms: u64,
    /// Pause after each flush cycle (default: 100).
    pub cooldown_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            wake_interval_ms: 5_000,
            cooldown_ms: 100,
        }
    }
}

impl FlushConfig {
    /// Config for testing (short intervals so tests finish quickly).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            wake_interval_ms: 50,
            cooldown_ms: 5,
        }
    }
}

/// Drains the pending buffer into the durable store.
pub struct FlushScheduler {
    buffer: Arc<PendingBuffer>,
    store: Arc<OpStore>,
    config: FlushConfig,
    shutdown: CancellationToken,
}

impl FlushScheduler {
    /// Create a scheduler over the given buffer and store.
    pub fn new(
        buffer: Arc<PendingBuffer>,
        store: Arc<OpStore>,
        config: FlushConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            store,
            config,
            shutdown,
        }
    }

    /// Run the flush loop until the shutdown token is cancelled.
    ///
    /// Cancellation triggers one final best-effort flush before returning.
    #[tracing::instrument(skip_all, name = "flush_scheduler")]
    pub async fn run(self) {
        let wake_interval = Duration::from_millis(self.config.wake_interval_ms);
        let cooldown = Duration::from_millis(self.config.cooldown_ms);
        info!(
            wake_interval_ms = self.config.wake_interval_ms,
            cooldown_ms = self.config.cooldown_ms,
            "flush scheduler started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.buffer.wait_dirty() => {}
                () = tokio::time::sleep(wake_interval) => {}
            }

            let _ = self.flush_cycle();

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(cooldown) => {}
            }
        }

        self.final_flush();
        info!("flush scheduler stopped");
    }

    /// Drain the buffer and write each session's batch in one transaction.
    ///
    /// Returns the number of operations persisted this cycle.
    fn flush_cycle(&self) -> usize {
        let drained = self.buffer.drain_all();
        let mut flushed = 0;

        for (session_id, ops) in drained {
            let count = ops.len();
            let start = Instant::now();
            match self.store.append_batch(&session_id, &ops) {
                Ok(written) => {
                    flushed += written;
                    counter!("ops_flushed_total").increment(written as u64);
                    histogram!("flush_duration_seconds").record(start.elapsed().as_secs_f64());
                    debug!(session_id = %session_id, count = written, "flushed op batch");
                }
                Err(e) => {
                    counter!("flush_failures_total").increment(1);
                    warn!(
                        session_id = %session_id,
                        count,
                        error = %e,
                        "flush failed, batch re-queued for retry"
                    );
                    self.buffer.restore(&session_id, ops);
                }
            }
        }

        flushed
    }

    /// Best-effort flush on shutdown. A failure here loses the batch with the
    /// process; it is logged loudly rather than retried.
    fn final_flush(&self) {
        for (session_id, ops) in self.buffer.drain_all() {
            let count = ops.len();
            if let Err(e) = self.store.append_batch(&session_id, &ops) {
                error!(
                    session_id = %session_id,
                    count,
                    error = %e,
                    "final flush failed, buffered operations lost"
                );
            } else {
                debug!(session_id = %session_id, count, "final flush persisted batch");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{PendingOp, SessionId};
    use easel_store::{ConnectionConfig, ConnectionPool, new_in_memory, run_migrations};
    use serde_json::json;

    fn make_pool() -> ConnectionPool {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        pool
    }

    fn op(n: i64) -> PendingOp {
        PendingOp::new(n, json!({"n": n}))
    }

    fn break_store(pool: &ConnectionPool) {
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "CREATE TRIGGER store_offline BEFORE INSERT ON canvas_ops
             BEGIN SELECT RAISE(ABORT, 'store offline'); END;",
        )
        .unwrap();
    }

    fn repair_store(pool: &ConnectionPool) {
        let conn = pool.get().unwrap();
        conn.execute_batch("DROP TRIGGER store_offline").unwrap();
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn default_config_values() {
        let config = FlushConfig::default();
        assert_eq!(config.wake_interval_ms, 5_000);
        assert_eq!(config.cooldown_ms, 100);
    }

    #[tokio::test]
    async fn flush_cycle_persists_batches_per_session() {
        let pool = make_pool();
        let store = Arc::new(OpStore::new(pool));
        let buffer = Arc::new(PendingBuffer::new());
        let scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            FlushConfig::for_testing(),
            CancellationToken::new(),
        );

        let s1 = SessionId::from("s1");
        let s2 = SessionId::from("s2");
        buffer.append(&s1, op(0));
        buffer.append(&s2, op(0));
        buffer.append(&s1, op(1));

        assert_eq!(scheduler.flush_cycle(), 3);
        assert_eq!(store.count(&s1).unwrap(), 2);
        assert_eq!(store.count(&s2).unwrap(), 1);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn dirty_signal_triggers_flush() {
        let pool = make_pool();
        let store = Arc::new(OpStore::new(pool));
        let buffer = Arc::new(PendingBuffer::new());
        let token = CancellationToken::new();
        let scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            FlushConfig {
                // Sweep far beyond the test horizon so only the signal can
                // wake the loop
                wake_interval_ms: 60_000,
                cooldown_ms: 5,
            },
            token.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        let session = SessionId::from("s1");
        buffer.append(&session, op(0));
        buffer.append(&session, op(1));

        let probe = Arc::clone(&store);
        let probe_session = session.clone();
        wait_until(move || probe.count(&probe_session).unwrap() == 2).await;

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn failed_batch_is_requeued_and_retried_on_sweep() {
        let pool = make_pool();
        let store = Arc::new(OpStore::new(pool.clone()));
        let buffer = Arc::new(PendingBuffer::new());
        let token = CancellationToken::new();
        let scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            FlushConfig::for_testing(),
            token.clone(),
        );

        break_store(&pool);
        let handle = tokio::spawn(scheduler.run());

        let session = SessionId::from("s1");
        buffer.append(&session, op(0));
        buffer.append(&session, op(1));

        // The signal-driven flush fails and re-queues; nothing is written
        // and nothing is discarded.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.count(&session).unwrap(), 0);
        assert_eq!(buffer.pending_count(), 2);

        // Once the store recovers, the periodic sweep retries the batch.
        repair_store(&pool);
        let probe = Arc::clone(&store);
        let probe_session = session.clone();
        wait_until(move || probe.count(&probe_session).unwrap() == 2).await;

        // Exactly once, in order
        let history = store.get_history(&session).unwrap();
        assert_eq!(history, vec![json!({"n": 0}), json!({"n": 1})]);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn retried_batch_stays_ahead_of_newer_appends() {
        let pool = make_pool();
        let store = Arc::new(OpStore::new(pool.clone()));
        let buffer = Arc::new(PendingBuffer::new());
        let scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            FlushConfig::for_testing(),
            CancellationToken::new(),
        );

        let session = SessionId::from("s1");
        buffer.append(&session, op(0));
        buffer.append(&session, op(1));

        break_store(&pool);
        assert_eq!(scheduler.flush_cycle(), 0);

        // Arrive while the store was down
        buffer.append(&session, op(2));

        repair_store(&pool);
        assert_eq!(scheduler.flush_cycle(), 3);

        let history = store.get_history(&session).unwrap();
        assert_eq!(
            history,
            vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]
        );
    }

    #[tokio::test]
    async fn concatenated_cycles_preserve_append_order() {
        let pool = make_pool();
        let store = Arc::new(OpStore::new(pool));
        let buffer = Arc::new(PendingBuffer::new());
        let scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            FlushConfig::for_testing(),
            CancellationToken::new(),
        );

        let session = SessionId::from("s1");
        let mut expected = Vec::new();
        for cycle in 0..4 {
            for k in 0..5 {
                let n = cycle * 5 + k;
                buffer.append(&session, op(n));
                expected.push(json!({"n": n}));
            }
            let _ = scheduler.flush_cycle();
        }

        assert_eq!(store.get_history(&session).unwrap(), expected);
    }

    #[tokio::test]
    async fn cancellation_runs_final_flush() {
        let pool = make_pool();
        let store = Arc::new(OpStore::new(pool));
        let buffer = Arc::new(PendingBuffer::new());
        let token = CancellationToken::new();
        let scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            FlushConfig {
                wake_interval_ms: 60_000,
                cooldown_ms: 5,
            },
            token.clone(),
        );

        let session = SessionId::from("s1");
        buffer.append(&session, op(0));

        // Cancel before the loop ever runs a cycle
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), scheduler.run())
            .await
            .unwrap();

        assert_eq!(store.count(&session).unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_cycle_writes_nothing() {
        let pool = make_pool();
        let store = Arc::new(OpStore::new(pool));
        let buffer = Arc::new(PendingBuffer::new());
        let scheduler = FlushScheduler::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            FlushConfig::for_testing(),
            CancellationToken::new(),
        );

        assert_eq!(scheduler.flush_cycle(), 0);
        assert_eq!(store.count(&SessionId::from("s1")).unwrap(), 0);
    }
}
