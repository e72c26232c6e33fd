//! Lap event type, sequence counter, and the delivery seam.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The literal text payload pushed to every viewer session for one lap.
///
/// The event stream carries no other application message.
pub const LAP_PAYLOAD: &str = "lap";

/// A single detected lap crossing.
///
/// The notification carries no content: the payload on the wire is always
/// [`LAP_PAYLOAD`]. The sequence number exists for logging and the health
/// endpoint, not for correctness; viewers receive order from their own
/// transport, never from this number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapEvent {
    /// Diagnostic sequence number, 1-based, monotonically increasing for
    /// the lifetime of the process.
    pub seq: u64,
}

impl LapEvent {
    /// Create an event with the given sequence number.
    #[must_use]
    pub fn new(seq: u64) -> Self {
        Self { seq }
    }

    /// The wire payload for this event.
    #[must_use]
    pub fn payload(&self) -> &'static str {
        LAP_PAYLOAD
    }
}

/// Monotonic lap sequence counter.
///
/// Shared between the sensor watcher (which assigns numbers) and the admin
/// surface (which reports how many laps have been seen).
#[derive(Debug, Default)]
pub struct LapCounter(AtomicU64);

impl LapCounter {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next sequence number (first call returns 1).
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of laps counted so far.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Destination for detected laps.
///
/// The sensor side publishes through this trait so it never holds a session
/// transport; the gateway's session registry is the production
/// implementation. Publishing must not fail — delivery problems are the
/// sink's to resolve (log, drop the session, carry on).
#[async_trait::async_trait]
pub trait LapSink: Send + Sync {
    /// Deliver one lap event to every currently-active session.
    async fn publish(&self, event: LapEvent);
}
