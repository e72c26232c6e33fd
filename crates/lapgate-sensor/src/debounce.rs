//! Process-wide trigger debouncing.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// One cooldown window shared by every monitored channel.
///
/// The first transition at startup, or after the window has elapsed, is
/// accepted and arms the window. Everything inside the window is discarded
/// outright — never queued, delayed, or replayed. The physical event this
/// models (one car crossing one line) cannot legitimately recur inside the
/// window, so a queued trigger could only be contact bounce.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accept: Mutex<Option<Instant>>,
}

impl Debouncer {
    /// Create a debouncer with the given cooldown window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accept: Mutex::new(None),
        }
    }

    /// The configured cooldown window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Accept or discard a trigger occurring now.
    ///
    /// Returns `true` exactly when the trigger is accepted, re-arming the
    /// window as a side effect.
    pub fn try_accept(&self) -> bool {
        self.try_accept_at(Instant::now())
    }

    fn try_accept_at(&self, now: Instant) -> bool {
        let mut last = self.last_accept.lock();
        match *last {
            Some(armed) if now.saturating_duration_since(armed) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
