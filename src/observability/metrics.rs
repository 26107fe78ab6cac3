//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_backend_health` (gauge): 1=alive, 0=unreachable
//! - `proxy_backend_score` (gauge): current desirability score
//!
//! # Design Decisions
//! - Updates are no-ops until a recorder is installed, so library users and
//!   tests pay nothing

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!(
        "proxy_request_duration_seconds",
        "backend" => backend.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a backend's liveness after a probe.
pub fn record_backend_health(backend: &str, alive: bool) {
    gauge!("proxy_backend_health", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}

/// Record a backend's current score. Skips non-finite scores (an
/// unreachable backend scores negative infinity).
pub fn record_backend_score(backend: &str, score: f64) {
    if score.is_finite() {
        gauge!("proxy_backend_score", "backend" => backend.to_string()).set(score);
    }
}
