//! # lapgate-core
//!
//! Shared vocabulary for the lap-trigger broadcaster:
//!
//! - [`LapEvent`]: the content-free "a lap occurred" notification
//! - [`LapCounter`]: monotonic sequence numbering for diagnostics
//! - [`LapSink`]: the seam between lap detection and event delivery
//! - [`errors`]: the `thiserror`-based error hierarchy

#![deny(unsafe_code)]

pub mod errors;
pub mod events;

pub use errors::{LapgateError, SensorError};
pub use events::{LAP_PAYLOAD, LapCounter, LapEvent, LapSink};
