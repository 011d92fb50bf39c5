//! HTTP + WebSocket front door.
//!
//! [`EaselServer`] owns the wired sync and storage components and exposes
//! them to Axum handlers through [`AppState`]. Routes: `/health`,
//! `/metrics`, `/ws`, `POST /sessions`, `GET /sessions/{session_id}/ops`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use easel_store::OpStore;
use easel_sync::{FanoutBus, PendingBuffer, RelayBridge, SessionRegistry};

use crate::config::ServerConfig;
use crate::health::HealthResponse;
use crate::shutdown::ShutdownCoordinator;
use crate::{http, metrics, websocket};

/// Everything a handler can reach. Cheap to clone; all fields are shared.
#[derive(Clone)]
pub struct AppState {
    /// Immutable server settings.
    pub config: Arc<ServerConfig>,
    /// Fan-out bus; also the way to the session registry.
    pub bus: Arc<FanoutBus>,
    /// Watches relay topics on behalf of local members.
    pub bridge: Arc<RelayBridge>,
    /// Operations waiting for the flush scheduler.
    pub buffer: Arc<PendingBuffer>,
    /// The durable op log.
    pub store: Arc<OpStore>,
    /// Root cancellation.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Renders the Prometheus exposition.
    pub metrics: PrometheusHandle,
    /// Boot instant, reported as uptime.
    pub start_time: Instant,
    /// Open sockets, maintained by the session loop.
    pub active_connections: Arc<AtomicUsize>,
}

/// Holds every long-lived component and serves the routes over them.
pub struct EaselServer {
    config: Arc<ServerConfig>,
    bus: Arc<FanoutBus>,
    bridge: Arc<RelayBridge>,
    buffer: Arc<PendingBuffer>,
    store: Arc<OpStore>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
    active_connections: Arc<AtomicUsize>,
}

impl EaselServer {
    /// Assemble a server from pre-wired components.
    ///
    /// The shutdown coordinator is minted here; callers reach it through
    /// [`Self::shutdown`] to cancel or to hand its token to other tasks.
    pub fn new(
        config: ServerConfig,
        bus: Arc<FanoutBus>,
        bridge: Arc<RelayBridge>,
        buffer: Arc<PendingBuffer>,
        store: Arc<OpStore>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bus,
            bridge,
            buffer,
            store,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn app_state(&self) -> AppState {
        AppState {
            config: Arc::clone(&self.config),
            bus: Arc::clone(&self.bus),
            bridge: Arc::clone(&self.bridge),
            buffer: Arc::clone(&self.buffer),
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            active_connections: Arc::clone(&self.active_connections),
        }
    }

    /// Axum router over a fresh [`AppState`].
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics_text))
            .route("/ws", get(websocket::session::ws_handler))
            .route("/sessions", post(http::create_session))
            .route("/sessions/{session_id}/ops", get(http::session_ops))
            .with_state(self.app_state())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve on a spawned task.
    ///
    /// Returns the bound address (meaningful with port `0`) and the task
    /// handle. The serve loop ends when the shutdown coordinator cancels.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(&self.config.bind_addr()).await?;
        let bound = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "serve loop ended with error");
            }
        });

        info!(addr = %bound, max_connections = self.config.max_connections, "listening");
        Ok((bound, handle))
    }

    /// The live configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shutdown coordinator shared with every spawned task.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The fan-out bus.
    pub fn bus(&self) -> &Arc<FanoutBus> {
        &self.bus
    }

    /// Registry of sessions and their members.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.bus.registry()
    }

    /// The durable op log.
    pub fn store(&self) -> &Arc<OpStore> {
        &self.store
    }

    /// Operations not yet flushed.
    pub fn buffer(&self) -> &Arc<PendingBuffer> {
        &self.buffer
    }
}

/// `GET /health`: liveness plus coarse load counters.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::gather(
        state.start_time,
        state.active_connections.load(Ordering::Relaxed),
        state.bus.registry().session_count(),
        state.buffer.pending_count(),
    ))
}

/// `GET /metrics`: Prometheus text exposition.
async fn metrics_text(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
