//! Session registry and delivery API.
//!
//! One entry per authenticated user identity, pointing at that user's
//! current connection. A fresh AUTH for an already-registered identity
//! overwrites the entry (last-authenticated-wins), so the overwritten
//! connection stops receiving deliveries even though its transport may
//! still be open.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use ventry_proto::envelope::EventEnvelope;

use super::connection::{Connection, OutboundFrame};

/// Process-wide map from user identity to its current connection.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Connection>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register `connection` as the current session for `user_id`.
    ///
    /// Overwrites any prior entry for the same identity.
    pub async fn insert(&self, user_id: impl Into<String>, connection: Arc<Connection>) {
        let user_id = user_id.into();
        let mut sessions = self.sessions.write().await;
        if let Some(prior) = sessions.insert(user_id.clone(), connection) {
            debug!(user_id, prior_conn = %prior.id, "session overwritten by new authentication");
        }
    }

    /// Remove the entry for `user_id` only if it still points at
    /// `connection_id`.
    ///
    /// Guards the close path against deleting a newer session that
    /// re-authenticated while this connection was shutting down. Returns
    /// whether an entry was removed.
    pub async fn remove_if_current(&self, user_id: &str, connection_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(user_id) {
            Some(current) if current.id == connection_id => {
                let _ = sessions.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// The current connection for `user_id`, if registered.
    pub async fn get(&self, user_id: &str) -> Option<Arc<Connection>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Number of registered sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Push an event to every registered connection that is still open.
    ///
    /// Serialized once; each delivery is best-effort. Failures are logged
    /// and never remove the entry — that is the close handler's job.
    pub async fn broadcast(&self, kind: impl Into<String>, payload: Value) {
        let envelope = EventEnvelope::new(kind, payload);
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(event_type = envelope.kind, error = %e, "failed to serialize event");
                return;
            }
        };
        let sessions = self.sessions.read().await;
        debug!(
            event_type = envelope.kind,
            recipients = sessions.len(),
            "broadcasting event"
        );
        for connection in sessions.values() {
            if !connection.is_open() {
                continue;
            }
            if !connection.send(OutboundFrame::Text(json.clone())) {
                warn!(conn_id = %connection.id, event_type = envelope.kind, "failed to deliver broadcast");
            }
        }
    }

    /// Push an event to the single registered connection for `user_id`.
    ///
    /// Silent no-op when the user has no registered open connection; there
    /// is no queuing and no error surfaced to the caller. Returns whether a
    /// delivery was attempted.
    pub async fn notify(&self, user_id: &str, kind: impl Into<String>, payload: Value) -> bool {
        let envelope = EventEnvelope::new(kind, payload);
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(event_type = envelope.kind, error = %e, "failed to serialize event");
                return false;
            }
        };
        let sessions = self.sessions.read().await;
        let Some(connection) = sessions.get(user_id) else {
            debug!(user_id, event_type = envelope.kind, "notify: no registered session");
            return false;
        };
        if !connection.is_open() {
            debug!(user_id, conn_id = %connection.id, "notify: session no longer open");
            return false;
        }
        if !connection.send(OutboundFrame::Text(json)) {
            warn!(user_id, conn_id = %connection.id, event_type = envelope.kind, "failed to deliver notification");
            return false;
        }
        true
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
