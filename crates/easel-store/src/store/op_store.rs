//! High-level transactional `OpStore` API.
//!
//! Composes the operation repository into atomic, session-centric methods.
//! [`OpStore::append_batch`] runs inside a single `SQLite` transaction:
//! either every operation in the batch lands or none do, so a failed flush
//! can be retried without duplicating rows.

use serde_json::Value;
use tracing::debug;

use easel_core::{PendingOp, SessionId};

use crate::errors::Result;
use crate::sqlite::connection::{ConnectionPool, PooledConnection};
use crate::sqlite::repositories::op::OpRepo;
use crate::sqlite::row_types::OpRow;

/// High-level operation store wrapping a connection pool.
pub struct OpStore {
    pool: ConnectionPool,
}

impl OpStore {
    /// Create a new `OpStore` with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Append a batch of operations for one session, atomically.
    ///
    /// Rows are inserted in slice order, so arrival order is preserved in the
    /// storage-assigned ids. An empty batch is a no-op. Returns the number of
    /// rows written.
    pub fn append_batch(&self, session_id: &SessionId, ops: &[PendingOp]) -> Result<usize> {
        if ops.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let created_at = chrono::Utc::now().to_rfc3339();

        for op in ops {
            let payload = serde_json::to_string(&op.payload)?;
            let _ = OpRepo::insert(&tx, session_id.as_str(), op.op_index, &payload, &created_at)?;
        }

        tx.commit()?;
        debug!(session_id = %session_id, count = ops.len(), "op batch persisted");
        Ok(ops.len())
    }

    /// Full replay for a session: payloads ordered by `(op_index, id)`.
    pub fn get_history(&self, session_id: &SessionId) -> Result<Vec<Value>> {
        let conn = self.conn()?;
        let rows = OpRepo::get_by_session(&conn, session_id.as_str())?;
        rows.into_iter()
            .map(|row| Ok(serde_json::from_str(&row.payload)?))
            .collect()
    }

    /// Full rows for a session in replay order, including storage metadata.
    pub fn list_ops(&self, session_id: &SessionId) -> Result<Vec<OpRow>> {
        let conn = self.conn()?;
        OpRepo::get_by_session(&conn, session_id.as_str())
    }

    /// Rows stored under one `(session, op_index)` pair, in arrival order.
    pub fn ops_at_index(&self, session_id: &SessionId, op_index: i64) -> Result<Vec<OpRow>> {
        let conn = self.conn()?;
        OpRepo::get_by_index(&conn, session_id.as_str(), op_index)
    }

    /// Number of operations stored for a session.
    pub fn count(&self, session_id: &SessionId) -> Result<i64> {
        let conn = self.conn()?;
        OpRepo::count_by_session(&conn, session_id.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::connection::{ConnectionConfig, new_in_memory};
    use crate::sqlite::migrations::run_migrations;
    use serde_json::json;

    fn make_store() -> OpStore {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        OpStore::new(pool)
    }

    fn make_ops(labels: &[&str]) -> Vec<PendingOp> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| PendingOp::new(i as i64, json!({"type": label})))
            .collect()
    }

    #[test]
    fn append_batch_then_get_history() {
        let store = make_store();
        let session = SessionId::from("s1");
        let ops = make_ops(&["line", "circle", "erase"]);

        let written = store.append_batch(&session, &ops).unwrap();
        assert_eq!(written, 3);

        let history = store.get_history(&session).unwrap();
        assert_eq!(
            history,
            vec![
                json!({"type": "line"}),
                json!({"type": "circle"}),
                json!({"type": "erase"}),
            ]
        );
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let store = make_store();
        let session = SessionId::from("s1");
        assert_eq!(store.append_batch(&session, &[]).unwrap(), 0);
        assert_eq!(store.count(&session).unwrap(), 0);
    }

    #[test]
    fn append_batch_is_all_or_nothing() {
        let store = make_store();
        let session = SessionId::from("s1");

        // Reject the third operation mid-transaction
        {
            let conn = store.conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_two BEFORE INSERT ON canvas_ops
                 WHEN NEW.op_index = 2
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }

        let ops = make_ops(&["line", "circle", "erase"]);
        let result = store.append_batch(&session, &ops);
        assert!(result.is_err());
        assert_eq!(store.count(&session).unwrap(), 0, "no partial batch");
    }

    #[test]
    fn retry_after_failure_writes_exactly_once() {
        let store = make_store();
        let session = SessionId::from("s1");

        {
            let conn = store.conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_two BEFORE INSERT ON canvas_ops
                 WHEN NEW.op_index = 2
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }

        let ops = make_ops(&["line", "circle", "erase"]);
        assert!(store.append_batch(&session, &ops).is_err());

        {
            let conn = store.conn().unwrap();
            conn.execute_batch("DROP TRIGGER reject_two").unwrap();
        }

        assert_eq!(store.append_batch(&session, &ops).unwrap(), 3);
        assert_eq!(store.count(&session).unwrap(), 3);
    }

    #[test]
    fn history_orders_by_index_then_arrival() {
        let store = make_store();
        let session = SessionId::from("s1");

        // Caller supplies indices out of order; storage keeps arrival order,
        // replay sorts by index.
        let ops = vec![
            PendingOp::new(1, json!({"n": "b"})),
            PendingOp::new(0, json!({"n": "a"})),
            PendingOp::new(1, json!({"n": "b2"})),
        ];
        let _ = store.append_batch(&session, &ops).unwrap();

        let history = store.get_history(&session).unwrap();
        assert_eq!(
            history,
            vec![
                json!({"n": "a"}),
                json!({"n": "b"}),
                json!({"n": "b2"}),
            ]
        );
    }

    #[test]
    fn sessions_do_not_interleave() {
        let store = make_store();
        let s1 = SessionId::from("s1");
        let s2 = SessionId::from("s2");

        let _ = store.append_batch(&s1, &make_ops(&["line"])).unwrap();
        let _ = store.append_batch(&s2, &make_ops(&["circle", "erase"])).unwrap();
        let _ = store.append_batch(&s1, &make_ops(&["rect"])).unwrap();

        let h1 = store.get_history(&s1).unwrap();
        assert_eq!(h1.len(), 2);
        assert_eq!(h1[0]["type"], "line");
        assert_eq!(h1[1]["type"], "rect");

        let h2 = store.get_history(&s2).unwrap();
        assert_eq!(h2.len(), 2);
        assert_eq!(h2[0]["type"], "circle");
        assert_eq!(h2[1]["type"], "erase");
    }

    #[test]
    fn ops_at_index_returns_arrival_order() {
        let store = make_store();
        let session = SessionId::from("s1");
        let ops = vec![
            PendingOp::new(3, json!({"n": "x"})),
            PendingOp::new(3, json!({"n": "y"})),
        ];
        let _ = store.append_batch(&session, &ops).unwrap();

        let rows = store.ops_at_index(&session, 3).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].payload.contains('x'));
        assert!(rows[1].payload.contains('y'));
    }

    #[test]
    fn history_of_unknown_session_is_empty() {
        let store = make_store();
        let history = store.get_history(&SessionId::from("missing")).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn list_ops_exposes_storage_metadata() {
        let store = make_store();
        let session = SessionId::from("s1");
        let _ = store.append_batch(&session, &make_ops(&["line"])).unwrap();

        let rows = store.list_ops(&session).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        assert!(!rows[0].created_at.is_empty());
    }
}
