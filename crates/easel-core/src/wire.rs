//! Wire frames for the whiteboard WebSocket protocol.
//!
//! JSON with a `type` tag and camelCase fields. Clients send [`ClientFrame`]s;
//! the server replies and fans out with [`ServerFrame`]s. Payloads are opaque
//! JSON values: the backend transports and stores them verbatim and never
//! inspects their contents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame received from a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Join a session (room). The server acks with [`ServerFrame::Joined`].
    #[serde(rename = "join")]
    Join {
        /// Session to join.
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// A drawing operation to broadcast and persist.
    #[serde(rename = "op")]
    Op {
        /// Session the operation belongs to.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Caller-assigned position in the session's sequence. Defaults to 0
        /// when omitted; the backend trusts it as-is.
        #[serde(rename = "opIndex", default)]
        op_index: i64,
        /// Opaque drawing command.
        payload: Value,
    },
    /// A transient canvas snapshot to share with other members. Fanned out
    /// like an op but never buffered or persisted.
    #[serde(rename = "state")]
    State {
        /// Session the snapshot belongs to.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Opaque snapshot data.
        payload: Value,
    },
}

impl ClientFrame {
    /// The session this frame targets.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Join { session_id }
            | Self::Op { session_id, .. }
            | Self::State { session_id, .. } => session_id,
        }
    }
}

/// A frame sent to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Ack for a successful join.
    #[serde(rename = "joined")]
    Joined {
        /// Session that was joined.
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// A drawing operation from another member of the session.
    #[serde(rename = "op")]
    Op {
        /// Session the operation belongs to.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Caller-assigned position in the session's sequence.
        #[serde(rename = "opIndex")]
        op_index: i64,
        /// Opaque drawing command.
        payload: Value,
    },
    /// A transient canvas snapshot from another member.
    #[serde(rename = "state")]
    State {
        /// Session the snapshot belongs to.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Opaque snapshot data.
        payload: Value,
    },
    /// Boundary rejection of a malformed or invalid frame.
    #[serde(rename = "error")]
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerFrame {
    /// The session this frame concerns, when it has one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Joined { session_id }
            | Self::Op { session_id, .. }
            | Self::State { session_id, .. } => Some(session_id),
            Self::Error { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
