//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the HTTP/WebSocket surface.
///
/// Deserializes with per-field fallbacks, so a config source only has to
/// name the fields it wants to change.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default `"127.0.0.1"`).
    pub host: String,
    /// Bind port; `0` asks the OS for a free one (default `5000`).
    pub port: u16,
    /// Concurrent WebSocket ceiling; upgrades past it get a 503
    /// (default `256`).
    pub max_connections: usize,
    /// Frames queued per connection before overflow drops start
    /// (default `1024`).
    pub send_queue_size: usize,
    /// Seconds between server-initiated pings (default `30`).
    pub heartbeat_interval_secs: u64,
    /// Seconds of ping silence before the server hangs up (default `60`).
    pub heartbeat_timeout_secs: u64,
    /// WebSocket message size cap in bytes (default 16 MiB). Canvas
    /// snapshots in `state` frames can be large.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            max_connections: 256,
            send_queue_size: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// `host:port` in the form `TcpListener::bind` wants.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping cadence as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Pong deadline as a [`Duration`].
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
