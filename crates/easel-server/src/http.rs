//! REST endpoints for session setup and history replay.
//!
//! New clients call `POST /sessions` before opening a WebSocket, then fetch
//! `GET /sessions/{id}/ops` to redraw the canvas up to the present. Sessions
//! have no server-side registration: any non-empty id is valid, and history
//! for an id nobody has drawn in is just empty.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::error;

use easel_core::SessionId;

use crate::server::AppState;

/// POST /sessions
///
/// Validates the requested session id and echoes it back. Malformed or
/// missing bodies are treated as an empty request.
pub async fn create_session(body: String) -> Response {
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    match parsed.get("sessionId").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => {
            (StatusCode::OK, Json(json!({ "sessionId": id }))).into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "sessionId required" })),
        )
            .into_response(),
    }
}

/// GET /sessions/{`session_id`}/ops
///
/// Returns the session's persisted operation payloads in replay order.
/// Operations still sitting in the pending buffer are not included; they
/// arrive over the WebSocket instead.
pub async fn session_ops(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = SessionId::from(session_id);
    match state.store.get_history(&session_id) {
        Ok(payloads) => Json(payloads).into_response(),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "failed to load op history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage unavailable" })),
            )
                .into_response()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
