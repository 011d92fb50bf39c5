//! The buffered drawing operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One drawing operation awaiting durable flush.
///
/// Operations carry a caller-assigned `op_index` and an opaque payload. The
/// backend preserves arrival order in the buffer and on disk; it does not
/// validate that indices are monotonic or gap-free.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingOp {
    /// Caller-assigned position in the session's sequence.
    pub op_index: i64,
    /// Opaque drawing command, stored verbatim.
    pub payload: Value,
}

impl PendingOp {
    /// Create a pending operation.
    #[must_use]
    pub fn new(op_index: i64, payload: Value) -> Self {
        Self { op_index, payload }
    }
}
