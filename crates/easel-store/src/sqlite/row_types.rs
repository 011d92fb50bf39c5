//! Database row types for mapping between `SQLite` rows and Rust structs.
//!
//! These represent the raw database row shape, not the public API types.
//! Conversion to public types happens in the store layer.

use serde::{Deserialize, Serialize};

/// Raw operation row from the `canvas_ops` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpRow {
    /// Storage-assigned rowid; records arrival order.
    pub id: i64,
    /// Session the operation belongs to.
    pub session_id: String,
    /// Caller-assigned position in the session's sequence.
    pub op_index: i64,
    /// Payload JSON as stored.
    pub payload: String,
    /// Insertion timestamp (RFC 3339).
    pub created_at: String,
}
