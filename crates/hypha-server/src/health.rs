//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"safe_mode"` while task dispatch is halted.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket sessions.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, operational: bool) -> HealthResponse {
    HealthResponse {
        status: if operational { "ok" } else { "safe_mode" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}
