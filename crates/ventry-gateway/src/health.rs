//! `/health` endpoint payload.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the gateway is running.
    pub status: String,
    /// Registered (authenticated) connection count.
    pub clients: usize,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
}

/// Build a health response from live counters.
pub fn health_snapshot(start_time: Instant, clients: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        clients,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}
