//! Gateway configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Ventry gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Heartbeat probe interval in seconds. A peer that misses a full
    /// interval is reaped, so dead-peer detection takes one to two intervals.
    pub heartbeat_interval_secs: u64,
    /// Max inbound WebSocket frame size in bytes.
    pub max_frame_bytes: usize,
    /// Per-connection outbound queue depth.
    pub send_queue: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_secs: 30,
            max_frame_bytes: 100 * 1024 * 1024, // 100 MB
            send_queue: 256,
        }
    }
}
