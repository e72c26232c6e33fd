//! Error hierarchy for the lap-trigger broadcaster.
//!
//! Built on [`thiserror`]:
//!
//! - [`LapgateError`]: top-level enum covering all error domains
//! - [`SensorError`]: hardware input failures with channel context
//!
//! Startup errors are fatal by contract — the binary chains them through
//! `anyhow` and exits. Runtime delivery and proxy failures never surface
//! here; they are recovered locally where they occur.

use std::fmt;

use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum LapgateError {
    /// Hardware input line failure.
    #[error("{0}")]
    Sensor(#[from] SensorError),

    /// Could not bind a listener socket.
    #[error("failed to bind listener on {addr}")]
    ListenerBind {
        /// The address that could not be bound.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid runtime configuration (e.g. an unparseable upstream origin).
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LapgateError {
    /// Create a listener-bind error.
    #[must_use]
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::ListenerBind {
            addr: addr.into(),
            source,
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl fmt::Display) -> Self {
        Self::Config(message.to_string())
    }
}

/// Hardware sensor failure.
///
/// Raised when an input line cannot be acquired or its event stream breaks.
/// At startup this is fatal; mid-run it retires the affected source while
/// the remaining channels keep triggering.
#[derive(Debug, Error)]
#[error("sensor failure{}: {message}", channel.map(|c| format!(" on channel {c}")).unwrap_or_default())]
pub struct SensorError {
    /// Input channel the failure relates to, if known.
    pub channel: Option<u32>,
    /// Human-readable message.
    pub message: String,
    /// Underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SensorError {
    /// Create a sensor error with no channel context.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            channel: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the input channel the failure occurred on.
    #[must_use]
    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}
