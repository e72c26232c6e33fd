//! `GatewayServer` — one public endpoint for the lap feed and the proxied
//! application, plus a small admin listener.
//!
//! Every public request enters [`dispatch`], which branches on WebSocket
//! upgrade-intent before any routing: upgrades become viewer sessions,
//! everything else goes to the upstream. There is exactly one public
//! listener; the lap feed and the proxied application share its port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use lapgate_core::{LapCounter, LapgateError};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::health::{self, HealthResponse};
use crate::proxy::ProxyClient;
use crate::registry::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::ws;

/// State shared by the public dispatch handler and socket tasks.
#[derive(Clone)]
pub struct AppState {
    /// Active session set.
    pub registry: Arc<SessionRegistry>,
    /// Upstream forwarding client.
    pub proxy: Arc<ProxyClient>,
    /// Gateway-wide shutdown signal.
    pub shutdown: tokio_util::sync::CancellationToken,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout.
    pub heartbeat_timeout: Duration,
    /// Per-session outbound buffer size.
    pub session_buffer: usize,
}

/// State for the admin router.
#[derive(Clone)]
struct AdminState {
    registry: Arc<SessionRegistry>,
    laps: Arc<LapCounter>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

/// Addresses and join handle of a running gateway.
pub struct Listening {
    /// Bound public address.
    pub public_addr: SocketAddr,
    /// Bound admin address.
    pub admin_addr: SocketAddr,
    /// Resolves when both listeners have shut down.
    pub handle: JoinHandle<()>,
}

/// The gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    registry: Arc<SessionRegistry>,
    laps: Arc<LapCounter>,
    proxy: Arc<ProxyClient>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a server; fails fast on an unusable upstream client config.
    pub fn new(
        config: GatewayConfig,
        registry: Arc<SessionRegistry>,
        laps: Arc<LapCounter>,
    ) -> Result<Self, LapgateError> {
        let proxy = Arc::new(ProxyClient::new(
            config.upstream.clone(),
            config.connect_timeout,
        )?);
        Ok(Self {
            config,
            registry,
            laps,
            proxy,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        })
    }

    /// Attach the Prometheus handle backing `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Get the session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the public router: one dispatch entry point, no other routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            proxy: Arc::clone(&self.proxy),
            shutdown: self.shutdown.token(),
            heartbeat_interval: self.config.heartbeat_interval,
            heartbeat_timeout: self.config.heartbeat_timeout,
            session_buffer: self.config.session_buffer,
        };
        Router::new().fallback(dispatch).with_state(state)
    }

    /// Build the admin router (`/health`, `/metrics`).
    pub fn admin_router(&self) -> Router {
        let state = AdminState {
            registry: Arc::clone(&self.registry),
            laps: Arc::clone(&self.laps),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind both listeners and serve until shutdown is triggered.
    pub async fn listen(&self) -> Result<Listening, LapgateError> {
        let public = bind(&self.config.host, self.config.port).await?;
        let admin = bind(&self.config.host, self.config.admin_port).await?;
        let public_addr = local_addr(&public)?;
        let admin_addr = local_addr(&admin)?;

        info!(
            %public_addr,
            %admin_addr,
            upstream = %self.config.upstream,
            "gateway listening"
        );

        let public_task = serve(public, self.router(), self.shutdown.token(), "public");
        let admin_task = serve(admin, self.admin_router(), self.shutdown.token(), "admin");
        let handle = tokio::spawn(async move {
            let _ = tokio::join!(public_task, admin_task);
        });

        Ok(Listening {
            public_addr,
            admin_addr,
            handle,
        })
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener, LapgateError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| LapgateError::bind(addr, e))
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr, LapgateError> {
    listener
        .local_addr()
        .map_err(|e| LapgateError::bind("<unknown>", e))
}

fn serve(
    listener: TcpListener,
    app: Router,
    token: tokio_util::sync::CancellationToken,
    name: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = async move { token.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(listener = name, error = %e, "listener failed");
        }
    })
}

/// The single public entry point.
///
/// Branches on upgrade-intent before any routing: a WebSocket upgrade is the
/// event-stream request and becomes a registered session; everything else is
/// forwarded to the upstream origin.
async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    if is_websocket_upgrade(req.headers()) {
        let (mut parts, _body) = req.into_parts();
        match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(upgrade) => upgrade
                .on_upgrade(move |socket| ws::handle_socket(socket, state))
                .into_response(),
            Err(rejection) => rejection.into_response(),
        }
    } else {
        state.proxy.forward(req).await
    }
}

/// Whether the request asks to switch protocols to WebSocket.
fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// GET /health (admin listener).
async fn health_handler(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.session_count(),
        state.laps.current(),
    ))
}

/// GET /metrics (admin listener).
async fn metrics_handler(State(state): State<AdminState>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use lapgate_settings::LapgateSettings;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_server(upstream: &str) -> GatewayServer {
        let mut settings = LapgateSettings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        settings.server.admin_port = 0;
        settings.upstream.origin = upstream.into();
        let config = GatewayConfig::from_settings(&settings).unwrap();
        GatewayServer::new(
            config,
            Arc::new(SessionRegistry::new()),
            Arc::new(LapCounter::new()),
        )
        .unwrap()
    }

    #[test]
    fn upgrade_intent_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));

        let _ = headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert!(is_websocket_upgrade(&headers));

        let _ = headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));

        let _ = headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[tokio::test]
    async fn non_upgrade_request_is_proxied() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app"))
            .respond_with(ResponseTemplate::new(200).set_body_string("dashboard"))
            .expect(1)
            .mount(&upstream)
            .await;

        let server = make_server(&upstream.uri());
        let app = server.router();
        let req = axum::http::Request::builder()
            .uri("/app")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert_eq!(&body[..], b"dashboard");
    }

    #[tokio::test]
    async fn malformed_upgrade_is_rejected_not_proxied() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&upstream)
            .await;

        let server = make_server(&upstream.uri());
        let app = server.router();
        // Upgrade-intent without the required WebSocket handshake headers
        let req = axum::http::Request::builder()
            .uri("/feed")
            .header(header::UPGRADE, "websocket")
            .header(header::CONNECTION, "upgrade")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn admin_health_reports_counters() {
        let server = make_server("http://127.0.0.1:9");
        let app = server.admin_router();
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["sessions"], 0);
        assert_eq!(parsed["laps"], 0);
    }

    #[tokio::test]
    async fn admin_metrics_without_recorder_is_empty_ok() {
        let server = make_server("http://127.0.0.1:9");
        let app = server.admin_router();
        let req = axum::http::Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_unknown_route_is_404() {
        let server = make_server("http://127.0.0.1:9");
        let app = server.admin_router();
        let req = axum::http::Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_and_shuts_down() {
        let server = make_server("http://127.0.0.1:9");
        let listening = server.listen().await.unwrap();
        assert_ne!(listening.public_addr.port(), 0);
        assert_ne!(listening.admin_addr.port(), 0);
        assert_ne!(listening.public_addr.port(), listening.admin_addr.port());

        server.shutdown().trigger();
        tokio::time::timeout(Duration::from_secs(5), listening.handle)
            .await
            .expect("shutdown timed out")
            .expect("join error");
    }

    #[tokio::test]
    async fn proxied_error_does_not_kill_the_listener() {
        // Upstream port with nothing listening
        let server = make_server("http://127.0.0.1:9");
        let app = server.router();

        let req = axum::http::Request::builder().uri("/a").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        // Router still serves the next request
        let req = axum::http::Request::builder().uri("/b").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
