//! Inbound frame dispatch — parses envelopes and drives the connection
//! lifecycle state machine.
//!
//! Nothing in here touches the socket. Each frame produces an [`Outcome`]
//! (optional reply plus a follow-up action) that the session loop applies,
//! which keeps the auth-first policy testable without a transport.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use ventry_proto::codes::{
    CLOSE_POLICY_VIOLATION, ERR_AUTH_REQUIRED, ERR_AUTH_USER_ID, ERR_INVALID_JSON,
};
use ventry_proto::envelope::ServerEnvelope;
use ventry_proto::frame::ClientFrame;

use super::connection::{Connection, ConnectionState};
use super::registry::SessionRegistry;

/// What the session loop should do after handling a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Keep reading.
    Continue,
    /// Send a close frame (after any queued reply) and tear down.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
}

/// Result of dispatching one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Control envelope to send back, if any.
    pub reply: Option<ServerEnvelope>,
    /// Follow-up action for the session loop.
    pub action: Action,
}

impl Outcome {
    fn reply(envelope: ServerEnvelope) -> Self {
        Self {
            reply: Some(envelope),
            action: Action::Continue,
        }
    }

    fn silent() -> Self {
        Self {
            reply: None,
            action: Action::Continue,
        }
    }

    fn reject(envelope: ServerEnvelope, code: u16, reason: &str) -> Self {
        Self {
            reply: Some(envelope),
            action: Action::Close {
                code,
                reason: reason.to_owned(),
            },
        }
    }
}

/// Collaborator seam for authenticated application frames.
///
/// The gateway does not interpret application payloads beyond the `type`
/// discriminator; implementations (order store, billing, notification
/// simulators) consume them here.
#[async_trait]
pub trait ApplicationSink: Send + Sync {
    /// Handle one application frame from an authenticated user.
    async fn on_frame(&self, user_id: &str, kind: &str, payload: Value);
}

/// Default sink: log and drop.
pub struct DiscardSink;

#[async_trait]
impl ApplicationSink for DiscardSink {
    async fn on_frame(&self, user_id: &str, kind: &str, _payload: Value) {
        debug!(user_id, kind, "application frame discarded (no sink configured)");
    }
}

/// Role bound when an AUTH frame carries none.
pub const DEFAULT_ROLE: &str = "user";

/// Handle one inbound text frame.
///
/// Never returns an error: parse failures and policy violations become
/// `ERROR` envelopes in the outcome.
pub async fn handle_frame(
    raw: &str,
    connection: &Arc<Connection>,
    registry: &SessionRegistry,
    sink: &dyn ApplicationSink,
) -> Outcome {
    let frame = match ClientFrame::parse(raw) {
        Ok(frame) => frame,
        Err(_) => {
            // Malformed input alone never costs the client its connection
            warn!(conn_id = %connection.id, "malformed frame received");
            return Outcome::reply(ServerEnvelope::error(ERR_INVALID_JSON));
        }
    };

    match frame {
        ClientFrame::Auth { user_id, role } => {
            if user_id.is_empty() {
                warn!(conn_id = %connection.id, "AUTH without userId");
                return Outcome::reply(ServerEnvelope::error(ERR_AUTH_USER_ID));
            }
            let role = role.unwrap_or_else(|| DEFAULT_ROLE.to_owned());
            let identity = connection.authenticate(user_id, role);
            registry
                .insert(identity.user_id.clone(), Arc::clone(connection))
                .await;
            info!(
                conn_id = %connection.id,
                user_id = identity.user_id,
                role = identity.role,
                "client authenticated"
            );
            Outcome::reply(ServerEnvelope::auth_success(
                identity.user_id,
                identity.role,
            ))
        }
        ClientFrame::Application { kind, payload } => {
            if connection.state() != ConnectionState::Authenticated {
                // Hard rule: nothing reaches collaborators before AUTH
                warn!(conn_id = %connection.id, kind, "message before authentication");
                return Outcome::reject(
                    ServerEnvelope::error(ERR_AUTH_REQUIRED),
                    CLOSE_POLICY_VIOLATION,
                    ERR_AUTH_REQUIRED,
                );
            }
            // Identity is bound before the state becomes Authenticated
            let user_id = connection
                .identity()
                .map(|identity| identity.user_id)
                .unwrap_or_default();
            sink.on_frame(&user_id, &kind, payload).await;
            Outcome::silent()
        }
    }
}
