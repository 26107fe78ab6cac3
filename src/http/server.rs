//! HTTP server: the forwarding shell around the selection engine.
//!
//! # Responsibilities
//! - Create the Axum router: `/stats` plus a catch-all forwarding handler
//! - Ask the selector for a backend per request and pipe the request through
//! - Report the realized outcome (duration, classification) back via the
//!   selection handle
//!
//! # Design Decisions
//! - The request path never fails because of selection: worst case it
//!   forwards to a degraded backend (fail open)
//! - 5xx from the backend and transport failures count as error outcomes;
//!   4xx is the client's problem, not the backend's

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderName, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use url::Url;

use crate::balancer::{Outcome, Selection, Selector};
use crate::config::ProxyConfig;
use crate::http::request::{RequestIdLayer, X_REQUEST_ID};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub selector: Arc<Selector>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server for the adaptive proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server around a selection engine.
    pub fn new(config: &ProxyConfig, selector: Arc<Selector>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState { selector, client };

        let router = Router::new()
            .route("/stats", get(stats_handler))
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http());

        Self { router }
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// One backend's row on the stats surface.
#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub id: String,
    pub endpoint: String,
    /// Last probe round-trip; `null` while unreachable.
    pub latency_ms: Option<f64>,
    pub latency_ewma_ms: Option<f64>,
    pub loss_percent: f64,
    pub probe_successes: u64,
    pub probe_failures: u64,
    pub total_probes: u64,
    pub request_count: u64,
    pub error_request_count: u64,
    pub error_rate: f64,
    pub active_requests: usize,
    pub queue_len: f64,
    pub queue_len_ewma: Option<f64>,
    pub alive: bool,
    /// Current score under the active policy; `null` when unreachable
    /// (negative infinity has no JSON rendering).
    pub score: Option<f64>,
}

async fn stats_handler(State(state): State<AppState>) -> Json<Vec<BackendStatus>> {
    let mut statuses = Vec::new();
    for snap in state.selector.store().snapshots() {
        let score = state.selector.score(&snap);
        statuses.push(BackendStatus {
            id: snap.id.clone(),
            endpoint: snap.endpoint.to_string(),
            latency_ms: snap.stats.latency_raw_ms,
            latency_ewma_ms: snap.stats.latency_ewma_ms,
            loss_percent: snap.loss_percent(),
            probe_successes: snap.stats.probe_successes,
            probe_failures: snap.stats.probe_failures,
            total_probes: snap.stats.total_probes,
            request_count: snap.stats.request_count,
            error_request_count: snap.stats.error_request_count,
            error_rate: snap.stats.error_rate,
            active_requests: snap.active_requests,
            queue_len: snap.stats.queue_len,
            queue_len_ewma: snap.stats.queue_len_ewma,
            alive: snap.alive(),
            score: score.is_finite().then_some(score),
        });
    }
    Json(statuses)
}

/// Main proxy handler: select a backend, forward, report the outcome.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().clone();
    let method_str = method.to_string();

    let Some(selection) = state.selector.select() else {
        tracing::warn!(request_id = %request_id, "No backends configured");
        metrics::record_request(&method_str, 503, "none", start);
        return (StatusCode::SERVICE_UNAVAILABLE, "No backends configured").into_response();
    };
    let backend_id = selection.backend().id.clone();
    metrics::record_backend_score(&backend_id, selection.score());

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        backend = %backend_id,
        score = selection.score(),
        "Forwarding request"
    );

    let (parts, body) = request.into_parts();

    // rewrite scheme/authority to the chosen backend
    let authority = backend_authority(selection.endpoint());
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = authority.clone();
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = Uri::from_parts(uri_parts).unwrap_or_else(|_| parts.uri.clone());

    let mut upstream = Request::builder()
        .method(method.clone())
        .uri(uri)
        .version(parts.version);
    if let Some(headers) = upstream.headers_mut() {
        for (k, v) in parts.headers.iter() {
            if is_skipped_request_header(k) {
                continue;
            }
            headers.insert(k.clone(), v.clone());
        }
        // the backend must see its own authority, not the proxy's
        if let Some(host) = authority
            .as_ref()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        {
            headers.insert(header::HOST, host);
        }
    }
    let upstream = match upstream.body(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            selection.complete(start.elapsed(), Outcome::Aborted);
            metrics::record_request(&method_str, 500, &backend_id, start);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Bad upstream request").into_response();
        }
    };

    match state.client.request(upstream).await {
        Ok(response) => {
            let status = response.status();
            let outcome = if status.is_server_error() {
                Outcome::ServerError
            } else {
                Outcome::Success
            };
            metrics::record_request(&method_str, status.as_u16(), &backend_id, start);

            // the outcome is only known once the body has flowed; completion
            // rides on the body so the in-flight slot and the realized
            // duration cover the whole transfer
            let (parts, body) = response.into_parts();
            let body = TrackedBody {
                inner: body,
                selection: Some(selection),
                outcome,
                start,
            };
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, backend = %backend_id, error = %e, "Upstream error");
            selection.complete(start.elapsed(), Outcome::TransportError);
            metrics::record_request(&method_str, 502, &backend_id, start);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// `host:port` authority of a backend endpoint.
fn backend_authority(endpoint: &Url) -> Option<Authority> {
    let host = endpoint.host_str()?;
    let rendered = match endpoint.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Authority::from_str(&rendered).ok()
}

/// Headers not copied onto the upstream request: `Host` is rewritten to the
/// backend's authority, the rest are hop-by-hop and describe the client
/// connection, not the proxied one.
fn is_skipped_request_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Upstream response body carrying the selection handle. The outcome is
/// reported when the last frame has been handed to the client, so the
/// in-flight slot stays held and the realized duration includes the body
/// transfer. Dropping it mid-stream lets the handle record an abort.
struct TrackedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    inner: B,
    selection: Option<Selection>,
    outcome: Outcome,
    start: Instant,
}

impl<B> HttpBody for TrackedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.as_mut().get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                if let Some(selection) = this.selection.take() {
                    selection.complete(this.start.elapsed(), this.outcome);
                }
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                // the head already went out, but the backend still failed
                if let Some(selection) = this.selection.take() {
                    selection.complete(this.start.elapsed(), Outcome::TransportError);
                }
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for TrackedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    fn drop(&mut self) {
        // a length-delimited body can end without a trailing `None` poll;
        // if the stream was fully consumed this is still a real completion
        if self.inner.is_end_stream() {
            if let Some(selection) = self.selection.take() {
                selection.complete(self.start.elapsed(), self.outcome);
            }
        }
    }
}
