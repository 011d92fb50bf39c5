//! WebSocket frame dispatch: parses incoming text as a [`ClientFrame`] and
//! routes join/op/state through the registry, buffer, and bus.

use std::sync::Arc;

use metrics::gauge;
use serde_json::Value;
use tracing::{debug, warn};

use easel_core::{ClientFrame, ConnectionId, PendingOp, ServerFrame, SessionId};
use easel_sync::ClientConnection;

use crate::server::AppState;

/// Handle one inbound text frame from a connected client.
///
/// Returns the frame to send back to the originating connection, if any:
/// a `joined` ack for joins, an `error` frame for malformed or invalid
/// input, and nothing for ops and state snapshots (those only fan out).
pub fn handle_frame(
    text: &str,
    connection: &Arc<ClientConnection>,
    state: &AppState,
) -> Option<ServerFrame> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id = %connection.id, "invalid frame received");
            return Some(ServerFrame::Error {
                message: format!("invalid frame: {e}"),
            });
        }
    };

    if frame.session_id().is_empty() {
        return Some(ServerFrame::Error {
            message: "sessionId required".into(),
        });
    }

    match frame {
        ClientFrame::Join { session_id } => {
            Some(on_join(state, &SessionId::from(session_id), connection))
        }
        ClientFrame::Op {
            session_id,
            op_index,
            payload,
        } => {
            on_operation(
                state,
                &SessionId::from(session_id),
                op_index,
                payload,
                &connection.id,
            );
            None
        }
        ClientFrame::State {
            session_id,
            payload,
        } => {
            on_state(state, &SessionId::from(session_id), payload, &connection.id);
            None
        }
    }
}

/// Register the connection as a session member and start watching the
/// session's relay topic.
///
/// Membership is visible to broadcasts before the ack is even queued, so a
/// client that waits for `joined` cannot miss operations sent after it.
pub fn on_join(
    state: &AppState,
    session_id: &SessionId,
    connection: &Arc<ClientConnection>,
) -> ServerFrame {
    let registry = state.bus.registry();
    registry.join(session_id, Arc::clone(connection));
    state.bridge.watch(session_id);
    gauge!("sessions_active").set(registry.session_count() as f64);
    debug!(session_id = %session_id, conn_id = %connection.id, "join handled");
    ServerFrame::Joined {
        session_id: session_id.to_string(),
    }
}

/// Buffer a drawing operation and fan it out to the other session members.
///
/// The append and the broadcast are both non-blocking; durability comes
/// later, on the flush scheduler's cadence. The caller-assigned `op_index`
/// is passed through untouched.
pub fn on_operation(
    state: &AppState,
    session_id: &SessionId,
    op_index: i64,
    payload: Value,
    origin: &ConnectionId,
) {
    state
        .buffer
        .append(session_id, PendingOp::new(op_index, payload.clone()));
    let frame = ServerFrame::Op {
        session_id: session_id.to_string(),
        op_index,
        payload,
    };
    state.bus.broadcast(session_id, &frame, Some(origin));
}

/// Fan a transient canvas snapshot out to the other session members.
///
/// Snapshots are never buffered or persisted; a member that misses one
/// catches up from the next.
pub fn on_state(state: &AppState, session_id: &SessionId, payload: Value, origin: &ConnectionId) {
    let frame = ServerFrame::State {
        session_id: session_id.to_string(),
        payload,
    };
    state.bus.broadcast(session_id, &frame, Some(origin));
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
