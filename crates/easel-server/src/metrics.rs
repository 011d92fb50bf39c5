//! Prometheus exposition for the whiteboard daemon.
//!
//! Counter and gauge updates live at the call sites (session loops, the
//! fan-out bus, the flush scheduler). This module owns recorder install,
//! the HELP text for every series the daemon emits, and rendering for
//! the `/metrics` endpoint.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

// Series names. Keep in sync with the `counter!`/`gauge!`/`histogram!`
// call sites; `describe_all` is the one place HELP text lives.

// Socket lifecycle.

/// Sockets accepted since boot (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Sockets closed since boot (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Sockets currently open (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Socket lifetime (histogram, seconds).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

// Fan-out.

/// Sessions with at least one member (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Frames dropped on full member queues (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Relay deliveries that returned an error (counter).
pub const RELAY_PUBLISH_FAILURES_TOTAL: &str = "relay_publish_failures_total";

// Durability.

/// Operations accepted into the pending buffer (counter).
pub const OPS_BUFFERED_TOTAL: &str = "ops_buffered_total";
/// Operations written durably (counter).
pub const OPS_FLUSHED_TOTAL: &str = "ops_flushed_total";
/// Flush batches that failed and were requeued (counter).
pub const FLUSH_FAILURES_TOTAL: &str = "flush_failures_total";
/// Wall time per flush batch (histogram, seconds).
pub const FLUSH_DURATION_SECONDS: &str = "flush_duration_seconds";

/// Install the global recorder and return the render handle.
///
/// Call once at boot, before the first metric update. Panics if another
/// recorder is already registered, which only happens on a double call.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("a metrics recorder is already installed");
    describe_all();
    info!("metrics recorder ready");
    handle
}

/// Text exposition for `/metrics`.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Register HELP text and units for every series the daemon emits.
fn describe_all() {
    describe_counter!(WS_CONNECTIONS_TOTAL, "Sockets accepted since boot");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "Sockets closed since boot");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "Sockets currently open");
    describe_histogram!(
        WS_CONNECTION_DURATION_SECONDS,
        Unit::Seconds,
        "Socket lifetime"
    );
    describe_gauge!(SESSIONS_ACTIVE, "Sessions with at least one member");
    describe_counter!(BROADCAST_DROPS_TOTAL, "Frames dropped on full member queues");
    describe_counter!(
        RELAY_PUBLISH_FAILURES_TOTAL,
        "Relay deliveries that returned an error"
    );
    describe_counter!(OPS_BUFFERED_TOTAL, "Operations accepted into the pending buffer");
    describe_counter!(OPS_FLUSHED_TOTAL, "Operations written durably");
    describe_counter!(FLUSH_FAILURES_TOTAL, "Flush batches that failed and were requeued");
    describe_histogram!(FLUSH_DURATION_SECONDS, Unit::Seconds, "Wall time per flush batch");
}
