//! The active session set and event fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lapgate_core::{LapEvent, LapSink};
use metrics::counter;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::session::ViewerSession;

/// Single source of truth for "who receives lap events".
///
/// All mutations (register/remove) and broadcast iteration are serialized
/// through the `RwLock`; individual sends are non-blocking `try_send`s, so a
/// slow viewer never holds the lock for the duration of its own misbehavior.
pub struct SessionRegistry {
    /// Active sessions indexed by session ID.
    sessions: RwLock<HashMap<Uuid, Arc<ViewerSession>>>,
    /// Atomic active count (avoids read-locking for count queries).
    active_count: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Wrap a transport sender in a new OPEN session and add it to the
    /// active set.
    pub async fn register(&self, tx: mpsc::Sender<Arc<String>>) -> Arc<ViewerSession> {
        let session = Arc::new(ViewerSession::new(tx));
        let mut sessions = self.sessions.write().await;
        if sessions
            .insert(session.id(), Arc::clone(&session))
            .is_none()
        {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        session
    }

    /// Mark a session CLOSED and drop it from the active set.
    ///
    /// Removing an unknown or already-removed session is a no-op.
    pub async fn remove(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.remove(&id) {
            session.close();
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Deliver one lap event to every session active right now.
    ///
    /// Snapshot semantics: sessions registered after this call starts do not
    /// see this event. A failed send is logged and queues that session for
    /// removal; it never stops delivery to the rest and never escapes this
    /// method.
    pub async fn broadcast(&self, event: &LapEvent) {
        let payload = Arc::new(event.payload().to_owned());
        let mut failed = Vec::new();
        {
            let sessions = self.sessions.read().await;
            let mut recipients = 0u32;
            for session in sessions.values() {
                match session.send(Arc::clone(&payload)) {
                    Ok(()) => recipients += 1,
                    Err(e) => {
                        counter!("broadcast_send_failures_total").increment(1);
                        warn!(session_id = %e.session_id, reason = %e.reason, "send failed, removing session");
                        failed.push(e.session_id);
                    }
                }
            }
            debug!(seq = event.seq, recipients, "lap broadcast");
        }
        if !failed.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in failed {
                if let Some(session) = sessions.remove(&id) {
                    session.close();
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Number of active sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LapSink for SessionRegistry {
    async fn publish(&self, event: LapEvent) {
        self.broadcast(&event).await;
    }
}
