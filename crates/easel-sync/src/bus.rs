//! Frame fan-out to session members and peer instances.
//!
//! [`FanoutBus`] serializes a frame once, pushes it to every local member of
//! the session except the originator, and then publishes it on the session's
//! relay topic for peer instances. Per-member delivery is `try_send` over each
//! connection's bounded queue; a slow member loses frames and is logged, it
//! never stalls the caller or the other members. Relay failure degrades
//! cross-instance fan-out and is logged; local delivery has already happened
//! by then.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use easel_core::{ConnectionId, ServerFrame, SessionId};

use crate::connection::ClientConnection;
use crate::registry::SessionRegistry;
use crate::relay::{Relay, RelayEnvelope};

/// Fan-out bus over a session registry and a relay.
pub struct FanoutBus {
    registry: Arc<SessionRegistry>,
    relay: Arc<dyn Relay>,
    /// This instance's id, stamped on published envelopes for echo
    /// suppression.
    instance_id: String,
}

impl FanoutBus {
    /// Create a bus for this process. Each bus gets a fresh instance id.
    pub fn new(registry: Arc<SessionRegistry>, relay: Arc<dyn Relay>) -> Self {
        Self {
            registry,
            relay,
            instance_id: Uuid::now_v7().to_string(),
        }
    }

    /// This instance's id as stamped on relay envelopes.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The registry this bus fans out over.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Deliver a frame to every member of a session except `exclude`, then
    /// publish it to peer instances.
    pub fn broadcast(
        &self,
        session_id: &SessionId,
        frame: &ServerFrame,
        exclude: Option<&ConnectionId>,
    ) {
        self.fan_out_local(session_id, frame, exclude);
        self.publish_remote(session_id, frame);
    }

    /// Local-only fan-out, used when re-broadcasting frames that arrived from
    /// a peer instance (publishing those again would loop).
    pub fn broadcast_local(
        &self,
        session_id: &SessionId,
        frame: &ServerFrame,
        exclude: Option<&ConnectionId>,
    ) {
        self.fan_out_local(session_id, frame, exclude);
    }

    /// Push a frame to a single connection.
    ///
    /// Returns `false` if the connection's queue was full or closed.
    pub fn deliver(&self, connection: &ClientConnection, frame: &ServerFrame) -> bool {
        connection.send_frame(frame)
    }

    fn fan_out_local(
        &self,
        session_id: &SessionId,
        frame: &ServerFrame,
        exclude: Option<&ConnectionId>,
    ) {
        let json = match serde_json::to_string(frame) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to serialize frame");
                return;
            }
        };
        let members = self.registry.members(session_id);
        let mut recipients = 0u32;
        for conn in &members {
            if exclude.is_some_and(|id| id == &conn.id) {
                continue;
            }
            recipients += 1;
            if !conn.send(Arc::clone(&json)) {
                counter!("broadcast_drops_total").increment(1);
                warn!(
                    conn_id = %conn.id,
                    session_id = %session_id,
                    total_drops = conn.drop_count(),
                    "failed to send frame to client (channel full)"
                );
            }
        }
        debug!(session_id = %session_id, recipients, "broadcast frame to session");
    }

    fn publish_remote(&self, session_id: &SessionId, frame: &ServerFrame) {
        let envelope = RelayEnvelope {
            origin: self.instance_id.clone(),
            frame: frame.clone(),
        };
        let json = match serde_json::to_string(&envelope) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to serialize relay envelope");
                return;
            }
        };
        if let Err(e) = self.relay.publish(session_id, json) {
            counter!("relay_publish_failures_total").increment(1);
            warn!(
                session_id = %session_id,
                error = %e,
                "relay publish failed, cross-instance fan-out degraded"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{MemoryRelay, RelayError};
    use serde_json::json;
    use tokio::sync::{broadcast, mpsc};

    struct FailingRelay;

    impl Relay for FailingRelay {
        fn publish(
            &self,
            _session_id: &SessionId,
            _message: Arc<String>,
        ) -> Result<usize, RelayError> {
            Err(RelayError::Publish("backend offline".into()))
        }

        fn subscribe(&self, _session_id: &SessionId) -> broadcast::Receiver<Arc<String>> {
            broadcast::channel(1).1
        }
    }

    fn make_member(
        registry: &SessionRegistry,
        session: &SessionId,
        id: &str,
    ) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(ConnectionId::from(id), tx));
        registry.join(session, conn);
        rx
    }

    fn make_bus() -> (Arc<SessionRegistry>, Arc<MemoryRelay>, FanoutBus) {
        let registry = Arc::new(SessionRegistry::new());
        let relay = Arc::new(MemoryRelay::new(8));
        let bus = FanoutBus::new(
            Arc::clone(&registry),
            Arc::clone(&relay) as Arc<dyn Relay>,
        );
        (registry, relay, bus)
    }

    fn op_frame(n: i64) -> ServerFrame {
        ServerFrame::Op {
            session_id: "s1".into(),
            op_index: n,
            payload: json!({"n": n}),
        }
    }

    #[tokio::test]
    async fn broadcast_excludes_originator() {
        let (registry, _relay, bus) = make_bus();
        let session = SessionId::from("s1");
        let mut rx_a = make_member(&registry, &session, "a");
        let mut rx_b = make_member(&registry, &session, "b");

        bus.broadcast(&session, &op_frame(0), Some(&ConnectionId::from("a")));

        assert!(rx_a.try_recv().is_err(), "originator must not receive");
        let msg = rx_b.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "op");
        assert_eq!(parsed["opIndex"], 0);
    }

    #[tokio::test]
    async fn broadcast_without_exclude_reaches_all() {
        let (registry, _relay, bus) = make_bus();
        let session = SessionId::from("s1");
        let mut rx_a = make_member(&registry, &session, "a");
        let mut rx_b = make_member(&registry, &session, "b");

        bus.broadcast(&session, &op_frame(0), None);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn members_receive_frames_in_broadcast_order() {
        let (registry, _relay, bus) = make_bus();
        let session = SessionId::from("s1");
        let mut rx = make_member(&registry, &session, "a");

        for n in 0..5 {
            bus.broadcast(&session, &op_frame(n), None);
        }

        for n in 0..5 {
            let msg = rx.try_recv().unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
            assert_eq!(parsed["opIndex"], n);
        }
    }

    #[tokio::test]
    async fn broadcast_publishes_envelope_to_relay() {
        let (_registry, relay, bus) = make_bus();
        let session = SessionId::from("s1");
        let mut topic_rx = relay.subscribe(&session);

        bus.broadcast(&session, &op_frame(7), None);

        let msg = topic_rx.try_recv().unwrap();
        let envelope: RelayEnvelope = serde_json::from_str(&msg).unwrap();
        assert_eq!(envelope.origin, bus.instance_id());
        assert_eq!(envelope.frame, op_frame(7));
    }

    #[tokio::test]
    async fn broadcast_local_does_not_publish() {
        let (registry, relay, bus) = make_bus();
        let session = SessionId::from("s1");
        let mut rx = make_member(&registry, &session, "a");
        let mut topic_rx = relay.subscribe(&session);

        bus.broadcast_local(&session, &op_frame(0), None);

        assert!(rx.try_recv().is_ok());
        assert!(topic_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn relay_failure_does_not_break_local_delivery() {
        let registry = Arc::new(SessionRegistry::new());
        let bus = FanoutBus::new(Arc::clone(&registry), Arc::new(FailingRelay));
        let session = SessionId::from("s1");
        let mut rx = make_member(&registry, &session, "a");

        bus.broadcast(&session, &op_frame(0), None);

        assert!(rx.try_recv().is_ok(), "local members still receive");
    }

    #[tokio::test]
    async fn slow_member_does_not_block_others() {
        let (registry, _relay, bus) = make_bus();
        let session = SessionId::from("s1");

        // One-slot queue that is already full
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let slow = Arc::new(ClientConnection::new(ConnectionId::from("slow"), slow_tx));
        assert!(slow.send(Arc::new("filler".into())));
        registry.join(&session, slow.clone());

        let mut rx_fast = make_member(&registry, &session, "fast");

        bus.broadcast(&session, &op_frame(0), None);

        assert!(rx_fast.try_recv().is_ok());
        assert_eq!(slow.drop_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_to_empty_session_is_noop() {
        let (_registry, _relay, bus) = make_bus();
        // Should not panic
        bus.broadcast(&SessionId::from("empty"), &op_frame(0), None);
    }

    #[tokio::test]
    async fn deliver_pushes_to_single_connection() {
        let (tx, mut rx) = mpsc::channel(8);
        let conn = ClientConnection::new(ConnectionId::from("a"), tx);
        let (_registry, _relay, bus) = make_bus();

        let frame = ServerFrame::Joined {
            session_id: "s1".into(),
        };
        assert!(bus.deliver(&conn, &frame));

        let msg = rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "joined");
    }

    #[test]
    fn instance_ids_are_unique() {
        let (_r1, _m1, bus1) = make_bus();
        let (_r2, _m2, bus2) = make_bus();
        assert_ne!(bus1.instance_id(), bus2.instance_id());
    }
}
