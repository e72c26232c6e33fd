//! Streaming reverse proxy to the upstream origin.
//!
//! Non-upgrade requests are forwarded with method, path, query, headers, and
//! body intact; hop-by-hop headers are stripped and `Host` is rewritten to
//! the upstream's host (the upstream client derives it from the target URL).
//! The upstream response streams back verbatim. Failures are per-request:
//! the caller gets 502/504 and every other connection is untouched.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, StatusCode, Uri, header};
use axum::response::Response;
use lapgate_core::LapgateError;
use metrics::counter;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Headers that are connection-local and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Why a proxied request failed.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Could not reach the upstream at all.
    #[error("upstream unreachable: {0}")]
    Connect(#[source] reqwest::Error),
    /// The upstream did not answer in time.
    #[error("upstream timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    /// The exchange failed mid-flight (bad response framing, reset, ...).
    #[error("upstream exchange failed: {0}")]
    Exchange(#[source] reqwest::Error),
}

impl ProxyError {
    fn classify(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else if err.is_connect() {
            Self::Connect(err)
        } else {
            Self::Exchange(err)
        }
    }

    /// Status surfaced to the original caller.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Connect(_) | Self::Exchange(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Forwards requests to one fixed upstream origin.
pub struct ProxyClient {
    http: reqwest::Client,
    upstream: Url,
}

impl ProxyClient {
    /// Build a proxy client for `upstream`.
    pub fn new(upstream: Url, connect_timeout: Duration) -> Result<Self, LapgateError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LapgateError::config(format!("upstream client: {e}")))?;
        Ok(Self { http, upstream })
    }

    /// The configured upstream origin.
    #[must_use]
    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Forward a request and return the upstream's response, or a gateway
    /// error response. Never panics, never takes the listener down.
    pub async fn forward(&self, req: Request) -> Response {
        counter!("proxy_requests_total").increment(1);
        match self.try_forward(req).await {
            Ok(response) => response,
            Err(err) => {
                counter!("proxy_errors_total").increment(1);
                warn!(error = %err, upstream = %self.upstream, "proxied request failed");
                let status = err.status();
                let body = status
                    .canonical_reason()
                    .unwrap_or("upstream error")
                    .to_owned();
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                response
            }
        }
    }

    async fn try_forward(&self, req: Request) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();
        let url = self.target_url(&parts.uri);
        debug!(method = %parts.method, %url, "forwarding to upstream");

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        // Host comes from the target URL, not the caller.
        let _ = headers.remove(header::HOST);

        let upstream_req = self
            .http
            .request(parts.method, url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .build()
            .map_err(ProxyError::classify)?;

        let upstream_resp = self
            .http
            .execute(upstream_req)
            .await
            .map_err(ProxyError::classify)?;

        let status = upstream_resp.status();
        let mut resp_headers = upstream_resp.headers().clone();
        strip_hop_by_hop(&mut resp_headers);

        let mut response = Response::new(Body::from_stream(upstream_resp.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = resp_headers;
        Ok(response)
    }

    /// Splice the inbound path and query onto the upstream origin.
    fn target_url(&self, uri: &Uri) -> Url {
        let mut url = self.upstream.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    }
}

/// Drop connection-local headers before forwarding.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        let _ = headers.remove(name);
    }
}
