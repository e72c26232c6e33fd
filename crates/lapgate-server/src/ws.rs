//! Upgraded viewer connection lifecycle.
//!
//! One task per socket: registers the session, pumps registry payloads out,
//! consumes inbound frames for liveness only (viewers send nothing the
//! gateway interprets), pings on the heartbeat interval, and removes the
//! session on every exit path — client close, write failure, heartbeat
//! timeout, or gateway shutdown.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::server::AppState;

pub(crate) async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Arc<String>>(state.session_buffer);
    let session = state.registry.register(tx).await;
    counter!("ws_sessions_total").increment(1);
    gauge!("ws_sessions_active").set(state.registry.session_count() as f64);
    info!(session_id = %session.id(), "viewer session opened");

    let hb_cancel = CancellationToken::new();
    let heartbeat = run_heartbeat(
        Arc::clone(&session),
        state.heartbeat_interval,
        state.heartbeat_timeout,
        hb_cancel.clone(),
    );
    tokio::pin!(heartbeat);

    let mut ping = tokio::time::interval(state.heartbeat_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the first ping belongs one
    // interval in.
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            payload = rx.recv() => {
                // None means the registry already dropped this session
                let Some(payload) = payload else { break };
                if let Err(e) = ws_tx.send(Message::Text(payload.as_str().into())).await {
                    debug!(session_id = %session.id(), error = %e, "socket write failed");
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %session.id(), "viewer closed connection");
                        break;
                    }
                    // Pongs and any stray frames count as signs of life;
                    // no inbound application message is interpreted.
                    Some(Ok(_)) => session.mark_alive(),
                    Some(Err(e)) => {
                        debug!(session_id = %session.id(), error = %e, "socket read failed");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            result = &mut heartbeat => {
                if result == HeartbeatResult::TimedOut {
                    warn!(
                        session_id = %session.id(),
                        silent_for = ?session.last_pong_elapsed(),
                        "session heartbeat timed out, reclaiming"
                    );
                }
                break;
            }
            () = state.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    hb_cancel.cancel();
    state.registry.remove(session.id()).await;
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_sessions_active").set(state.registry.session_count() as f64);
    info!(session_id = %session.id(), age = ?session.age(), "viewer session closed");
}
