//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

// Metric name constants to avoid typos across crates.

/// Laps accepted by the debouncer (counter).
pub const LAPS_DETECTED_TOTAL: &str = "laps_detected_total";
/// Sensor source failures (counter).
pub const SENSOR_SOURCE_ERRORS_TOTAL: &str = "sensor_source_errors_total";
/// Viewer sessions opened (counter).
pub const WS_SESSIONS_TOTAL: &str = "ws_sessions_total";
/// Viewer sessions closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently active viewer sessions (gauge).
pub const WS_SESSIONS_ACTIVE: &str = "ws_sessions_active";
/// Broadcast sends that failed and removed their session (counter).
pub const BROADCAST_SEND_FAILURES_TOTAL: &str = "broadcast_send_failures_total";
/// Requests forwarded to the upstream (counter).
pub const PROXY_REQUESTS_TOTAL: &str = "proxy_requests_total";
/// Forwarded requests that failed at the gateway (counter).
pub const PROXY_ERRORS_TOTAL: &str = "proxy_errors_total";
