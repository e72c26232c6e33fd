//! Viewer session state.
//!
//! A [`ViewerSession`] is owned by the registry from registration until
//! removal; the socket task only ever holds the matching receiver. Sends are
//! non-blocking — a session that cannot take a message right now has failed,
//! and the failure is a typed [`SendFailed`] outcome rather than a silently
//! dropped boolean.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Why a send to a session failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendFailedReason {
    /// The transport channel is gone (socket task exited) or the session was
    /// already closed.
    Closed,
    /// The per-session buffer is full. Lap events arrive at most once per
    /// cooldown window, so a full buffer means the transport is wedged.
    Backpressure,
}

impl fmt::Display for SendFailedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Backpressure => write!(f, "backpressure"),
        }
    }
}

/// Unrecoverable delivery failure for one session.
///
/// The registry reacts by removing the session; delivery to every other
/// session is unaffected.
#[derive(Debug, Error)]
#[error("send to session {session_id} failed: {reason}")]
pub struct SendFailed {
    /// The session the send was addressed to.
    pub session_id: Uuid,
    /// Failure classification.
    pub reason: SendFailedReason,
}

/// One connected viewer.
pub struct ViewerSession {
    id: Uuid,
    tx: mpsc::Sender<Arc<String>>,
    open: AtomicBool,
    connected_at: Instant,
    alive: AtomicBool,
    last_pong: Mutex<Instant>,
}

impl ViewerSession {
    /// Create an OPEN session around a transport sender.
    pub(crate) fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::now_v7(),
            tx,
            open: AtomicBool::new(true),
            connected_at: now,
            alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
        }
    }

    /// Unique session identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the session is still OPEN.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Transition to CLOSED. Idempotent; a closed session rejects all sends.
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    /// Push a payload toward the viewer without blocking.
    pub fn send(&self, payload: Arc<String>) -> Result<(), SendFailed> {
        if !self.is_open() {
            return Err(self.failed(SendFailedReason::Closed));
        }
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(self.failed(SendFailedReason::Backpressure)),
            Err(TrySendError::Closed(_)) => Err(self.failed(SendFailedReason::Closed)),
        }
    }

    fn failed(&self, reason: SendFailedReason) -> SendFailed {
        SendFailed {
            session_id: self.id,
            reason,
        }
    }

    /// Record liveness (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for the heartbeat.
    ///
    /// Returns `true` if the session showed life since the last check.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last sign of life.
    #[must_use]
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Session age.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> (ViewerSession, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (ViewerSession::new(tx), rx)
    }

    #[test]
    fn new_session_is_open() {
        let (session, _rx) = make_session();
        assert!(session.is_open());
    }

    #[test]
    fn ids_are_unique() {
        let (a, _rx_a) = make_session();
        let (b, _rx_b) = make_session();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn send_delivers_payload() {
        let (session, mut rx) = make_session();
        session.send(Arc::new("lap".into())).unwrap();
        let payload = rx.recv().await.unwrap();
        assert_eq!(&**payload, "lap");
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (session, mut rx) = make_session();
        for i in 0..5 {
            session.send(Arc::new(format!("m{i}"))).unwrap();
        }
        for i in 0..5 {
            assert_eq!(&**rx.recv().await.unwrap(), &format!("m{i}"));
        }
    }

    #[test]
    fn send_to_dropped_receiver_is_closed_failure() {
        let (tx, rx) = mpsc::channel(8);
        let session = ViewerSession::new(tx);
        drop(rx);
        assert_matches::assert_matches!(
            session.send(Arc::new("lap".into())),
            Err(SendFailed {
                reason: SendFailedReason::Closed,
                ..
            })
        );
    }

    #[test]
    fn send_to_full_buffer_is_backpressure_failure() {
        let (tx, _rx) = mpsc::channel(1);
        let session = ViewerSession::new(tx);
        session.send(Arc::new("one".into())).unwrap();
        let err = session.send(Arc::new("two".into())).unwrap_err();
        assert_eq!(err.reason, SendFailedReason::Backpressure);
    }

    #[test]
    fn closed_session_rejects_sends() {
        let (session, _rx) = make_session();
        session.close();
        assert!(!session.is_open());
        let err = session.send(Arc::new("lap".into())).unwrap_err();
        assert_eq!(err.reason, SendFailedReason::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let (session, _rx) = make_session();
        session.close();
        session.close();
        assert!(!session.is_open());
    }

    #[test]
    fn alive_flag_checks_and_resets() {
        let (session, _rx) = make_session();
        assert!(session.check_alive());
        assert!(!session.check_alive());
        session.mark_alive();
        assert!(session.check_alive());
    }

    #[test]
    fn send_failed_display() {
        let (session, _rx) = make_session();
        session.close();
        let err = session.send(Arc::new("lap".into())).unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(err.to_string().contains(&session.id().to_string()));
    }

    #[test]
    fn age_increases() {
        let (session, _rx) = make_session();
        let age1 = session.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(session.age() > age1);
    }
}
