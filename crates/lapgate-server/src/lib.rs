//! # lapgate-server
//!
//! The single public endpoint of the lap-trigger broadcaster.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `server` | Listener setup, upgrade-or-proxy dispatch, admin router |
//! | `registry` | Active session set, snapshot broadcast, `LapSink` impl |
//! | `session` | Per-viewer transport handle with typed send failures |
//! | `ws` | Upgraded connection lifecycle (write pump, pings, teardown) |
//! | `heartbeat` | Ping/pong liveness with a missed-pong budget |
//! | `proxy` | Streaming reverse proxy to the upstream origin |
//! | `health` | `/health` payload on the admin listener |
//! | `metrics` | Prometheus recorder + metric name constants |
//! | `shutdown` | `CancellationToken`-based coordinated teardown |
//!
//! ## Data flow
//!
//! Every inbound request hits one dispatch handler. WebSocket upgrades become
//! registered viewer sessions fed by [`registry::SessionRegistry::broadcast`];
//! everything else is forwarded to the upstream origin and streamed back.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod heartbeat;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
mod ws;

pub use config::GatewayConfig;
pub use registry::SessionRegistry;
pub use server::GatewayServer;
pub use session::{SendFailed, ViewerSession};
