//! Operation repository: an append-only log of drawing operations.
//!
//! Rows are immutable once written. Replay order is `(op_index, id)`:
//! `op_index` comes from the caller and is stored untouched; the
//! storage-assigned `id` preserves arrival order and breaks ties when a
//! caller reuses or reorders indices.

use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::sqlite::row_types::OpRow;

const SELECT_COLUMNS: &str = "id, session_id, op_index, payload, created_at";

/// Operation repository. Stateless; every method takes `&Connection`.
pub struct OpRepo;

impl OpRepo {
    /// Insert a single operation row. Returns the storage-assigned id.
    pub fn insert(
        conn: &Connection,
        session_id: &str,
        op_index: i64,
        payload: &str,
        created_at: &str,
    ) -> Result<i64> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO canvas_ops (session_id, op_index, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let _ = stmt.execute(params![session_id, op_index, payload, created_at])?;
        Ok(conn.last_insert_rowid())
    }

    /// Get all operations for a session in replay order.
    pub fn get_by_session(conn: &Connection, session_id: &str) -> Result<Vec<OpRow>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM canvas_ops
             WHERE session_id = ?1
             ORDER BY op_index ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![session_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get the operations stored under one `(session_id, op_index)` pair, in
    /// arrival order. More than one row is possible since indices are not
    /// unique.
    pub fn get_by_index(conn: &Connection, session_id: &str, op_index: i64) -> Result<Vec<OpRow>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM canvas_ops
             WHERE session_id = ?1 AND op_index = ?2
             ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![session_id, op_index], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count operations stored for a session.
    pub fn count_by_session(conn: &Connection, session_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM canvas_ops WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OpRow> {
        Ok(OpRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            op_index: row.get(2)?,
            payload: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
