//! Inbound frame classification.
//!
//! The gateway recognizes exactly one handshake type, `AUTH`. Every other
//! well-formed envelope is an application frame whose payload the gateway
//! forwards without interpretation; whether it is accepted depends on the
//! connection's lifecycle state, which is the dispatcher's concern.

use serde_json::Value;

/// The `type` value that triggers the authentication handshake.
pub const AUTH_FRAME_TYPE: &str = "AUTH";

/// A parsed inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Authentication handshake: binds a user identity to the connection.
    Auth {
        /// Client-asserted user identity. May be empty; the dispatcher
        /// rejects empty identities without closing the connection.
        user_id: String,
        /// Optional free-form role string.
        role: Option<String>,
    },
    /// Any other envelope. Forwarded to collaborators once authenticated.
    Application {
        /// The `type` discriminator.
        kind: String,
        /// The remaining envelope fields.
        payload: Value,
    },
}

/// Frame-level parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Not a JSON object with a string `type` field.
    #[error("invalid JSON message")]
    Malformed,
}

impl ClientFrame {
    /// Classify a raw text frame.
    ///
    /// A frame is well-formed when it parses as a JSON object carrying a
    /// string `type`. Unknown types are not an error at this layer — they
    /// become [`ClientFrame::Application`] and the lifecycle state machine
    /// decides their fate.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| FrameError::Malformed)?;
        let Value::Object(mut fields) = value else {
            return Err(FrameError::Malformed);
        };
        let kind = match fields.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(FrameError::Malformed),
        };

        if kind == AUTH_FRAME_TYPE {
            let user_id = fields
                .get("userId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let role = fields
                .get("role")
                .and_then(Value::as_str)
                .map(str::to_owned);
            return Ok(Self::Auth { user_id, role });
        }

        let _ = fields.remove("type");
        Ok(Self::Application {
            kind,
            payload: Value::Object(fields),
        })
    }
}
