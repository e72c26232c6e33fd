//! Gateway runtime configuration.
//!
//! Built once in the binary from [`lapgate_settings`] (plus CLI overrides)
//! and immutable afterwards. The upstream origin is parsed to a [`Url`] here
//! so an unusable origin fails at startup, not on the first proxied request.

use std::time::Duration;

use lapgate_core::LapgateError;
use lapgate_settings::LapgateSettings;
use reqwest::Url;

/// Configuration for the gateway listeners.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Host both listeners bind on.
    pub host: String,
    /// Public gateway port (`0` for auto-assign).
    pub port: u16,
    /// Admin port for `/health` and `/metrics` (`0` for auto-assign).
    pub admin_port: u16,
    /// Origin all non-upgrade requests are forwarded to.
    pub upstream: Url,
    /// Connect timeout for upstream requests.
    pub connect_timeout: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout; a session missing pongs this long is reclaimed.
    pub heartbeat_timeout: Duration,
    /// Per-session outbound buffer; a full buffer is a send failure.
    pub session_buffer: usize,
}

impl GatewayConfig {
    /// Build a config from loaded settings, validating the upstream origin.
    pub fn from_settings(settings: &LapgateSettings) -> Result<Self, LapgateError> {
        let upstream = parse_origin(&settings.upstream.origin)?;
        Ok(Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            admin_port: settings.server.admin_port,
            upstream,
            connect_timeout: Duration::from_millis(settings.upstream.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(settings.server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(settings.server.heartbeat_timeout_ms),
            session_buffer: settings.server.session_buffer,
        })
    }

    /// Replace the upstream origin (used by the binary for CLI overrides).
    pub fn with_upstream(mut self, origin: &str) -> Result<Self, LapgateError> {
        self.upstream = parse_origin(origin)?;
        Ok(self)
    }
}

/// Parse and validate an upstream origin string.
fn parse_origin(origin: &str) -> Result<Url, LapgateError> {
    let url: Url = origin
        .parse()
        .map_err(|e| LapgateError::config(format!("upstream origin {origin:?}: {e}")))?;
    if url.host_str().is_none() {
        return Err(LapgateError::config(format!(
            "upstream origin {origin:?} has no host"
        )));
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LapgateError::config(format!(
            "upstream origin {origin:?} must be http or https"
        )));
    }
    Ok(url)
}
