//! Shutdown coordination.
//!
//! A single [`ShutdownCoordinator`] owns the root `CancellationToken`. The
//! HTTP accept loop, every WebSocket session, and the flush scheduler hold
//! clones; one cancel fans out to all of them. The flush scheduler treats
//! the cancel as its cue to run a final flush, which is why the binary
//! drains tasks instead of just exiting.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits before
/// aborting stragglers.
const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Owner of the root cancellation token.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with an uncancelled token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone the token for a task to select on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel. Safe to call more than once; the token latches.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then drain `handles` within one shared grace period.
    ///
    /// Handles are awaited in order against an absolute deadline, so the
    /// total wait never exceeds `grace` (default 30s) no matter how many
    /// tasks there are. A task still running at the deadline is aborted.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, grace: Option<Duration>) {
        let grace = grace.unwrap_or(DEFAULT_GRACE);
        self.shutdown();
        info!(
            tasks = handles.len(),
            grace_secs = grace.as_secs(),
            "draining tasks"
        );

        let deadline = tokio::time::Instant::now() + grace;
        for (index, mut task) in handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    warn!(index, error = %e, "task panicked during shutdown");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(index, "task outlived the grace period, aborting");
                    task.abort();
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
