//! Per-socket connection state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;
use ventry_proto::envelope::ServerEnvelope;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport accepted, greeting not yet sent.
    Connecting,
    /// Transport open, no identity bound.
    Unauthenticated,
    /// Identity bound and registered.
    Authenticated,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

/// Identity bound to a connection by a successful AUTH handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Client-asserted user identifier. Not verified.
    pub user_id: String,
    /// Client-asserted role.
    pub role: String,
}

/// A frame queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A serialized JSON envelope.
    Text(String),
    /// A heartbeat probe.
    Ping,
    /// Close the transport after flushing everything queued before it.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
}

/// One live transport connection.
pub struct Connection {
    /// Opaque identifier, generated at accept. Logging and correlation only.
    pub id: String,
    state: Mutex<ConnectionState>,
    identity: Mutex<Option<Identity>>,
    tx: mpsc::Sender<OutboundFrame>,
    /// Liveness flag: reset by each heartbeat tick, set by pong receipt.
    pub is_alive: AtomicBool,
    /// Peer address, diagnostics only.
    pub remote_addr: Option<SocketAddr>,
    /// When the transport was accepted.
    pub connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl Connection {
    /// Create a connection in `Connecting` state.
    pub fn new(
        id: String,
        tx: mpsc::Sender<OutboundFrame>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(ConnectionState::Connecting),
            identity: Mutex::new(None),
            tx,
            is_alive: AtomicBool::new(true),
            remote_addr,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether frames may still be delivered to this connection.
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Unauthenticated | ConnectionState::Authenticated
        )
    }

    /// `Connecting` → `Unauthenticated`, once the greeting has been sent.
    pub fn mark_open(&self) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Unauthenticated;
        }
    }

    /// Bind an identity and move to `Authenticated`.
    ///
    /// Re-authentication rebinds; the registry applies last-write-wins
    /// separately. No-op on a closing or closed connection.
    pub fn authenticate(&self, user_id: impl Into<String>, role: impl Into<String>) -> Identity {
        let identity = Identity {
            user_id: user_id.into(),
            role: role.into(),
        };
        let mut state = self.state.lock();
        if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
            return identity;
        }
        *state = ConnectionState::Authenticated;
        *self.identity.lock() = Some(identity.clone());
        identity
    }

    /// The bound identity, if authentication has happened.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }

    /// Enter teardown. Idempotent; never touches a `Closed` connection.
    pub fn begin_close(&self) {
        let mut state = self.state.lock();
        if *state != ConnectionState::Closed {
            *state = ConnectionState::Closing;
        }
    }

    /// Terminal transition. Idempotent.
    pub fn mark_closed(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }

    /// Queue a frame for the writer task.
    ///
    /// Non-blocking: returns `false` (and counts the drop) when the queue is
    /// full or the writer is gone. Callers treat delivery as best-effort.
    pub fn send(&self, frame: OutboundFrame) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and queue a control envelope.
    pub fn send_envelope(&self, envelope: &ServerEnvelope) -> bool {
        match serde_json::to_string(envelope) {
            Ok(json) => self.send(OutboundFrame::Text(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize envelope");
                false
            }
        }
    }

    /// Frames dropped on the outbound queue so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Mark the peer alive (pong or ping received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Take-and-reset the alive flag.
    ///
    /// Returns `true` if the peer showed life since the previous call.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (Connection, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(32);
        (Connection::new("conn_1".into(), tx, None), rx)
    }

    #[test]
    fn new_connection_is_connecting() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.identity().is_none());
        assert!(!conn.is_open());
    }

    #[test]
    fn mark_open_transitions_to_unauthenticated() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        assert_eq!(conn.state(), ConnectionState::Unauthenticated);
        assert!(conn.is_open());
    }

    #[test]
    fn mark_open_only_applies_from_connecting() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        let _ = conn.authenticate("u1", "staff");
        conn.mark_open();
        assert_eq!(conn.state(), ConnectionState::Authenticated);
    }

    #[test]
    fn authenticate_binds_identity() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        let identity = conn.authenticate("u1", "staff");
        assert_eq!(identity.user_id, "u1");
        assert_eq!(conn.state(), ConnectionState::Authenticated);
        assert_eq!(conn.identity(), Some(identity));
    }

    #[test]
    fn reauthenticate_rebinds() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        let _ = conn.authenticate("u1", "staff");
        let _ = conn.authenticate("u2", "admin");
        assert_eq!(conn.identity().unwrap().user_id, "u2");
        assert_eq!(conn.identity().unwrap().role, "admin");
    }

    #[test]
    fn authenticate_is_a_no_op_while_closing() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        conn.begin_close();
        let _ = conn.authenticate("u1", "staff");
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.identity().is_none());
    }

    #[test]
    fn close_transitions_are_idempotent() {
        let (conn, _rx) = make_connection();
        conn.mark_open();
        conn.begin_close();
        assert_eq!(conn.state(), ConnectionState::Closing);
        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
        // Closing an already-closed connection must not resurrect it
        conn.begin_close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_queues_frame() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(OutboundFrame::Text("hello".into())));
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, OutboundFrame::Text("hello".into()));
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (conn, mut rx) = make_connection();
        for i in 0..5 {
            assert!(conn.send(OutboundFrame::Text(format!("m{i}"))));
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), OutboundFrame::Text(format!("m{i}")));
        }
    }

    #[test]
    fn send_to_closed_channel_counts_drop() {
        let (tx, rx) = mpsc::channel(32);
        let conn = Connection::new("conn_2".into(), tx, None);
        drop(rx);
        assert!(!conn.send(OutboundFrame::Ping));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_to_full_channel_counts_drop() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new("conn_3".into(), tx, None);
        assert!(conn.send(OutboundFrame::Ping));
        assert!(!conn.send(OutboundFrame::Ping));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_envelope_serializes() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send_envelope(&ServerEnvelope::error("nope")));
        let OutboundFrame::Text(json) = rx.recv().await.unwrap() else {
            panic!("expected text frame");
        };
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "ERROR");
        assert_eq!(parsed["error"], "nope");
    }

    #[test]
    fn alive_flag_check_and_reset() {
        let (conn, _rx) = make_connection();
        // Fresh connections count as alive for the first probe
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }
}
