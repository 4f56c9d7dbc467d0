//! Outbound envelopes.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current UTC time as RFC 3339 with millisecond precision.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Control envelope emitted by the gateway itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    /// Sent once, immediately after the transport upgrade completes.
    #[serde(rename = "CONNECTION_ESTABLISHED", rename_all = "camelCase")]
    ConnectionEstablished {
        /// Opaque connection identifier, for client-side correlation.
        connection_id: String,
        /// Envelope creation time.
        timestamp: String,
    },
    /// Sent when an AUTH handshake succeeds.
    #[serde(rename = "AUTH_SUCCESS", rename_all = "camelCase")]
    AuthSuccess {
        /// The identity now bound to the connection.
        user_id: String,
        /// The role bound alongside it.
        role: String,
        /// Envelope creation time.
        timestamp: String,
        /// Server wall-clock time, for client clock-skew estimation.
        server_time: String,
    },
    /// Sent on malformed input or a policy violation.
    #[serde(rename = "ERROR")]
    Error {
        /// Human-readable description.
        error: String,
        /// Envelope creation time.
        timestamp: String,
    },
}

impl ServerEnvelope {
    /// Build the post-upgrade greeting.
    pub fn connection_established(connection_id: impl Into<String>) -> Self {
        Self::ConnectionEstablished {
            connection_id: connection_id.into(),
            timestamp: timestamp_now(),
        }
    }

    /// Build the successful-handshake reply.
    pub fn auth_success(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        let now = timestamp_now();
        Self::AuthSuccess {
            user_id: user_id.into(),
            role: role.into(),
            timestamp: now.clone(),
            server_time: now,
        }
    }

    /// Build an error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            timestamp: timestamp_now(),
        }
    }
}

/// Application event pushed on behalf of an external collaborator.
///
/// Serializes as `{"type": <kind>, ...payload}` — the payload fields sit at
/// the top level of the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Flattened payload fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl EventEnvelope {
    /// Build an event envelope from any JSON payload.
    ///
    /// Objects flatten as-is, `null` contributes nothing, and any other
    /// value is carried under a `data` key so the wire unit stays an object.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        let mut payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                let _ = map.insert("data".to_owned(), other);
                map
            }
        };
        // The discriminator owns the "type" key on the wire.
        let _ = payload.remove("type");
        Self {
            kind: kind.into(),
            payload,
        }
    }
}
