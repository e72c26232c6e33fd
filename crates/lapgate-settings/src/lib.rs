//! # lapgate-settings
//!
//! Configuration for the lap-trigger gateway.
//!
//! Settings are loaded once at process start from three layers
//! (in priority order):
//! 1. **Compiled defaults** — [`LapgateSettings::default()`]
//! 2. **User file** — `~/.lapgate/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `LAPGATE_*` overrides (highest priority)
//!
//! There is no hot reload: the gateway reads its configuration exactly once
//! and treats every value as immutable for the life of the process. Command
//! line flags in the binary override all three layers.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
