//! `/health` endpoint payload.
//!
//! Reports liveness plus the three numbers an operator checks first on a
//! whiteboard node: open sockets, rooms with members, and how many drawing
//! operations are still waiting on the next flush.

use std::time::Instant;

use serde::Serialize;

/// Body served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` whenever the process can answer at all.
    pub status: &'static str,
    /// Whole seconds since boot.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Sessions with at least one member.
    pub active_sessions: usize,
    /// Operations buffered but not yet durable.
    pub pending_ops: usize,
}

impl HealthResponse {
    /// Assemble the payload from live counters.
    #[must_use]
    pub fn gather(
        started: Instant,
        connections: usize,
        active_sessions: usize,
        pending_ops: usize,
    ) -> Self {
        Self {
            status: "ok",
            uptime_secs: started.elapsed().as_secs(),
            connections,
            active_sessions,
            pending_ops,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
