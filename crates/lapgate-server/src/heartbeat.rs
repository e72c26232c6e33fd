//! Ping/pong liveness monitoring for viewer sessions.
//!
//! The reference behavior left a session registered forever if its transport
//! never reported closure; this loop reclaims such sessions after a bounded
//! number of missed pongs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::session::ViewerSession;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The viewer stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally (normal disconnect/shutdown).
    Cancelled,
}

/// Monitor one session's liveness.
///
/// At each `interval` tick the session's alive flag is checked and reset.
/// Consecutive ticks without a sign of life accumulate; once
/// `timeout / interval` (at least 1) misses are reached the session is
/// considered dead and [`HeartbeatResult::TimedOut`] is returned. The actual
/// Ping frames are sent by the socket task; any inbound frame counts as
/// life.
pub async fn run_heartbeat(
    session: Arc<ViewerSession>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticks = time::interval(interval);
    // The first tick fires immediately; consume it so the first real check
    // happens one interval in.
    let _ = ticks.tick().await;

    let interval_ms = interval.as_millis().max(1);
    let max_missed = (timeout.as_millis() / interval_ms).max(1) as u32;
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                if session.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
