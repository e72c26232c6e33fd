//! Settings types with compiled defaults.
//!
//! All types use camelCase on the wire so a hand-written
//! `~/.lapgate/settings.json` reads naturally, and every section falls back
//! to its defaults when absent from the file.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LapgateSettings {
    /// Public + admin listener settings.
    pub server: ServerSettings,
    /// Upstream dashboard origin the gateway forwards to.
    pub upstream: UpstreamSettings,
    /// Lap sensor input settings.
    pub sensor: SensorSettings,
}

/// Listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind both listeners on.
    pub host: String,
    /// Public gateway port (event-stream upgrades + proxied traffic).
    pub port: u16,
    /// Admin port (`/health`, `/metrics`).
    pub admin_port: u16,
    /// Heartbeat ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout in milliseconds (session reclaimed after this long
    /// without a pong).
    pub heartbeat_timeout_ms: u64,
    /// Per-session outbound message buffer; a full buffer is treated as an
    /// unrecoverable send failure.
    pub session_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            admin_port: 8081,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            session_buffer: 32,
        }
    }
}

/// Upstream origin configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Origin all non-upgrade requests are forwarded to, scheme included.
    pub origin: String,
    /// Connect timeout for upstream requests in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            origin: "https://localhost:3000".into(),
            connect_timeout_ms: 10_000,
        }
    }
}

/// Sensor input configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorSettings {
    /// GPIO character device path.
    pub chip: String,
    /// Input line offsets to watch. Any watched channel triggers the same
    /// debounced lap stream, so one broken wire does not silence the system.
    pub channels: Vec<u32>,
    /// Cooldown window in milliseconds after an accepted trigger.
    pub debounce_ms: u64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            chip: "/dev/gpiochip0".into(),
            channels: vec![23, 24],
            debounce_ms: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 8080);
        assert_eq!(s.admin_port, 8081);
        assert_eq!(s.heartbeat_interval_ms, 30_000);
        assert_eq!(s.heartbeat_timeout_ms, 90_000);
        assert_eq!(s.session_buffer, 32);
    }

    #[test]
    fn sensor_defaults_watch_two_channels() {
        let s = SensorSettings::default();
        assert_eq!(s.channels.len(), 2);
        assert_eq!(s.debounce_ms, 3000);
        assert_eq!(s.chip, "/dev/gpiochip0");
    }

    #[test]
    fn upstream_defaults() {
        let s = UpstreamSettings::default();
        assert_eq!(s.origin, "https://localhost:3000");
        assert_eq!(s.connect_timeout_ms, 10_000);
    }

    #[test]
    fn serde_roundtrip() {
        let settings = LapgateSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: LapgateSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, settings.server.port);
        assert_eq!(back.sensor.channels, settings.sensor.channels);
        assert_eq!(back.upstream.origin, settings.upstream.origin);
    }

    #[test]
    fn camel_case_field_names() {
        let json = serde_json::to_value(LapgateSettings::default()).unwrap();
        assert!(json["server"].get("adminPort").is_some());
        assert!(json["server"].get("heartbeatIntervalMs").is_some());
        assert!(json["sensor"].get("debounceMs").is_some());
        assert!(json["upstream"].get("connectTimeoutMs").is_some());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: LapgateSettings =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        // Untouched sections and fields keep their defaults
        assert_eq!(settings.server.admin_port, 8081);
        assert_eq!(settings.sensor.debounce_ms, 3000);
    }
}
