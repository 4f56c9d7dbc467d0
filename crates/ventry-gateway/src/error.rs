//! Gateway error type.
//!
//! Only server startup is fallible toward the caller. Per-connection
//! failures (parse errors, policy violations, send failures) are converted
//! into `ERROR` envelopes or logged, never propagated.

/// Errors surfaced by [`crate::server::GatewayServer`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The listen socket could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
