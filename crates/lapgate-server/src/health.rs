//! `/health` payload for the admin listener.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the gateway is running.
    pub status: String,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// Current viewer session count.
    pub sessions: usize,
    /// Laps detected since startup.
    pub laps: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, sessions: usize, laps: u64) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        sessions,
        laps,
    }
}
