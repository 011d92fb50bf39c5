//! One task per socket: the session loop owns a client's WebSocket from
//! upgrade to disconnect, including heartbeats and teardown.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use easel_core::ConnectionId;
use easel_sync::ClientConnection;

use super::handler::handle_frame;
use crate::server::AppState;

/// `GET /ws`: upgrade to a whiteboard session.
///
/// Refuses the upgrade with 503 once `max_connections` clients are already
/// connected.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.active_connections.load(Ordering::Relaxed) >= state.config.max_connections {
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let conn_id = ConnectionId::new();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| session_loop(socket, conn_id, state))
}

/// Drive one client for its whole lifetime.
///
/// The socket splits in two: a spawned task drains the connection's bounded
/// queue into the sink and pings on the heartbeat timer, while this task
/// feeds incoming text frames through [`handle_frame`]. Whichever half
/// stops first ends the session; teardown then leaves every joined session
/// and releases relay topics that lost their last local member.
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn session_loop(ws: WebSocket, conn_id: ConnectionId, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_size);
    let connection = Arc::new(ClientConnection::new(conn_id.clone(), send_tx));

    let connection_start = Instant::now();
    let _ = state.active_connections.fetch_add(1, Ordering::Relaxed);
    info!("client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    // Outbound half: queued frames out, Ping on the quiet timer.
    let ping_interval = state.config.heartbeat_interval();
    let pong_timeout = state.config.heartbeat_timeout();
    let outbound_conn = Arc::clone(&connection);
    let outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // interval fires once up front; swallow that tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Inbound half runs on this task.
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(_) | Message::Binary(_) => {
                let text = frame_text(&msg);
                if text.is_none() {
                    info!("received non-UTF8 binary frame");
                }
                text
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };

        if let Some(reply) = handle_frame(&text, &connection, &state) {
            if !connection.send_frame(&reply) {
                info!("failed to enqueue reply (channel full or closed)");
            }
        }
    }

    info!("client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection_start.elapsed().as_secs_f64());
    let _ = state.active_connections.fetch_sub(1, Ordering::Relaxed);
    outbound.abort();

    // Leaving the registry names the topics that lost their last member.
    let registry = state.bus.registry();
    for session_id in registry.leave(&conn_id) {
        state.bridge.unwatch(&session_id);
    }
    gauge!("sessions_active").set(registry.session_count() as f64);
}

/// Extract a UTF-8 payload from a Text or Binary frame.
///
/// Some clients send JSON in binary frames; non-UTF8 binary is discarded.
fn frame_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(data) => std::str::from_utf8(data).map(str::to_owned).ok(),
        _ => None,
    }
}
