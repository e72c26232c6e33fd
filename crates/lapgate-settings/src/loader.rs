//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`LapgateSettings::default()`]
//! 2. If `~/.lapgate/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `LAPGATE_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::LapgateSettings;

/// Resolve the path to the settings file (`~/.lapgate/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lapgate").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LapgateSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<LapgateSettings> {
    let defaults = serde_json::to_value(LapgateSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: LapgateSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules: integers must be valid and within
/// range, channel lists must be comma-separated line offsets. Invalid values
/// are silently ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut LapgateSettings) {
    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("LAPGATE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("LAPGATE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_u16("LAPGATE_ADMIN_PORT", 1, 65535) {
        settings.server.admin_port = v;
    }
    if let Some(v) = read_env_u64("LAPGATE_HEARTBEAT_INTERVAL_MS", 1000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("LAPGATE_HEARTBEAT_TIMEOUT_MS", 1000, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("LAPGATE_SESSION_BUFFER", 1, 65_536) {
        settings.server.session_buffer = v;
    }

    // ── Upstream settings ───────────────────────────────────────────
    if let Some(v) = read_env_string("LAPGATE_UPSTREAM") {
        settings.upstream.origin = v;
    }
    if let Some(v) = read_env_u64("LAPGATE_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.upstream.connect_timeout_ms = v;
    }

    // ── Sensor settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("LAPGATE_GPIO_CHIP") {
        settings.sensor.chip = v;
    }
    if let Some(v) = read_env_channels("LAPGATE_CHANNELS") {
        settings.sensor.channels = v;
    }
    if let Some(v) = read_env_u64("LAPGATE_DEBOUNCE_MS", 10, 600_000) {
        settings.sensor.debounce_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a comma-separated list of line offsets (`"23,24"`).
///
/// Returns `None` if the list is empty or any entry fails to parse.
pub fn parse_channels(val: &str) -> Option<Vec<u32>> {
    let channels: Vec<u32> = val
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if channels.is_empty() { None } else { Some(channels) }
}

/// Parse a `u16` constrained to `min..=max`.
pub fn parse_u16_in_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.parse::<u16>().ok().filter(|v| (min..=max).contains(v))
}

/// Parse a `u64` constrained to `min..=max`.
pub fn parse_u64_in_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.parse::<u64>().ok().filter(|v| (min..=max).contains(v))
}

/// Parse a `usize` constrained to `min..=max`.
pub fn parse_usize_in_range(val: &str, min: usize, max: usize) -> Option<usize> {
    val.parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    parse_u16_in_range(&std::env::var(name).ok()?, min, max)
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    parse_u64_in_range(&std::env::var(name).ok()?, min, max)
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    parse_usize_in_range(&std::env::var(name).ok()?, min, max)
}

fn read_env_channels(name: &str) -> Option<Vec<u32>> {
    parse_channels(&std::env::var(name).ok()?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
