//! Session membership registry.
//!
//! Tracks which connections belong to which session (room membership). A
//! connection may belong to several sessions at once, so the registry keeps a
//! forward map (session → members) and a reverse map (connection → sessions)
//! under one lock. Reads far outnumber writes: every broadcast takes a member
//! snapshot, while joins and leaves only happen on client activity.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use easel_core::{ConnectionId, SessionId};

use crate::connection::ClientConnection;

#[derive(Default)]
struct Inner {
    /// Members of each session.
    sessions: HashMap<SessionId, HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Reverse index: sessions each connection belongs to.
    memberships: HashMap<ConnectionId, HashSet<SessionId>>,
}

/// Registry of session memberships.
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a connection as a member of a session.
    ///
    /// Idempotent: joining a session the connection already belongs to changes
    /// nothing. Membership is visible to [`members`](Self::members) the moment
    /// this returns.
    pub fn join(&self, session_id: &SessionId, connection: Arc<ClientConnection>) {
        let conn_id = connection.id.clone();
        let mut inner = self.inner.write();
        let _ = inner
            .sessions
            .entry(session_id.clone())
            .or_default()
            .insert(conn_id.clone(), connection);
        let _ = inner
            .memberships
            .entry(conn_id.clone())
            .or_default()
            .insert(session_id.clone());
        drop(inner);
        debug!(session_id = %session_id, conn_id = %conn_id, "connection joined session");
    }

    /// Snapshot of the current members of a session.
    ///
    /// Unknown sessions return an empty vector.
    pub fn members(&self, session_id: &SessionId) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read();
        inner
            .sessions
            .get(session_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of members in a session.
    pub fn member_count(&self, session_id: &SessionId) -> usize {
        let inner = self.inner.read();
        inner.sessions.get(session_id).map_or(0, HashMap::len)
    }

    /// Sessions a connection currently belongs to.
    pub fn sessions_of(&self, connection_id: &ConnectionId) -> Vec<SessionId> {
        let inner = self.inner.read();
        inner
            .memberships
            .get(connection_id)
            .map(|sessions| sessions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a connection from every session it belongs to.
    ///
    /// Returns the sessions that became empty as a result, so the caller can
    /// release per-session resources. Unknown connections are a no-op.
    pub fn leave(&self, connection_id: &ConnectionId) -> Vec<SessionId> {
        let mut inner = self.inner.write();
        let Some(sessions) = inner.memberships.remove(connection_id) else {
            return Vec::new();
        };

        let mut emptied = Vec::new();
        for session_id in &sessions {
            if let Some(members) = inner.sessions.get_mut(session_id) {
                let _ = members.remove(connection_id);
                if members.is_empty() {
                    let _ = inner.sessions.remove(session_id);
                    emptied.push(session_id.clone());
                }
            }
        }
        drop(inner);
        debug!(
            conn_id = %connection_id,
            sessions = sessions.len(),
            emptied = emptied.len(),
            "connection left all sessions"
        );
        emptied
    }

    /// Number of sessions with at least one member.
    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().memberships.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(ConnectionId::from(id), tx);
        (Arc::new(conn), rx)
    }

    #[test]
    fn join_adds_member() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        registry.join(&SessionId::from("s1"), conn);

        assert_eq!(registry.member_count(&SessionId::from("s1")), 1);
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn join_is_idempotent() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let session = SessionId::from("s1");
        registry.join(&session, conn.clone());
        registry.join(&session, conn);

        assert_eq!(registry.member_count(&session), 1);
        assert_eq!(registry.sessions_of(&ConnectionId::from("c1")).len(), 1);
    }

    #[test]
    fn membership_is_visible_immediately() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let session = SessionId::from("s1");
        registry.join(&session, conn);

        let members = registry.members(&session);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id.as_str(), "c1");
    }

    #[test]
    fn members_of_unknown_session_is_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.members(&SessionId::from("nope")).is_empty());
        assert_eq!(registry.member_count(&SessionId::from("nope")), 0);
    }

    #[test]
    fn connection_can_join_multiple_sessions() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        registry.join(&SessionId::from("s1"), conn.clone());
        registry.join(&SessionId::from("s2"), conn);

        let mut sessions = registry.sessions_of(&ConnectionId::from("c1"));
        sessions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].as_str(), "s1");
        assert_eq!(sessions[1].as_str(), "s2");
    }

    #[test]
    fn leave_removes_from_all_sessions() {
        let registry = SessionRegistry::new();
        let (c1, _rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        registry.join(&SessionId::from("s1"), c1.clone());
        registry.join(&SessionId::from("s2"), c1);
        registry.join(&SessionId::from("s1"), c2);

        let emptied = registry.leave(&ConnectionId::from("c1"));

        // s2 had only c1; s1 still has c2
        assert_eq!(emptied, vec![SessionId::from("s2")]);
        assert_eq!(registry.member_count(&SessionId::from("s1")), 1);
        assert_eq!(registry.member_count(&SessionId::from("s2")), 0);
        assert!(registry.sessions_of(&ConnectionId::from("c1")).is_empty());
    }

    #[test]
    fn leave_unknown_connection_is_noop() {
        let registry = SessionRegistry::new();
        let emptied = registry.leave(&ConnectionId::from("ghost"));
        assert!(emptied.is_empty());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn leave_prunes_empty_sessions() {
        let registry = SessionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        registry.join(&SessionId::from("s1"), conn);
        assert_eq!(registry.session_count(), 1);

        let _ = registry.leave(&ConnectionId::from("c1"));
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn two_connections_share_a_session() {
        let registry = SessionRegistry::new();
        let (c1, _rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        let session = SessionId::from("s1");
        registry.join(&session, c1);
        registry.join(&session, c2);

        let mut ids: Vec<String> = registry
            .members(&session)
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c1".to_owned(), "c2".to_owned()]);
    }

    #[test]
    fn default_registry_is_empty() {
        let registry = SessionRegistry::default();
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }
}
