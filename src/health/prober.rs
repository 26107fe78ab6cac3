//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe every backend's health endpoint
//! - Fold round-trip time and reachability into the backend's EWMAs
//!
//! # Design Decisions
//! - Timeouts actively cancel the in-flight probe (dropping the request
//!   future tears down the connection attempt)
//! - Any non-2xx, connection error, or timeout is a full-loss sample

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time;

use crate::balancer::backend::Backend;
use crate::balancer::store::BackendStore;
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::observability::metrics;

pub struct HealthProber {
    store: Arc<BackendStore>,
    config: ProbeConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthProber {
    pub fn new(store: Arc<BackendStore>, config: ProbeConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            store,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.config.interval_ms,
            timeout_ms = self.config.timeout_ms,
            path = %self.config.path,
            "Health prober starting"
        );

        let mut ticker = time::interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend once. Sequential: the sweep is awaited before the
    /// next tick fires, so probes never overlap.
    pub async fn sweep(&self) {
        for backend in self.store.backends() {
            match self.probe_one(backend).await {
                Ok(rtt_ms) => {
                    backend.record_probe_success(rtt_ms, self.config.ewma_alpha);
                    let snap = backend.snapshot();
                    tracing::debug!(
                        backend = %backend.id,
                        rtt_ms,
                        loss_percent = snap.loss_percent(),
                        latency_ewma_ms = snap.stats.latency_ewma_ms,
                        "Probe ok"
                    );
                }
                Err(e) => {
                    backend.record_probe_failure(self.config.ewma_alpha);
                    tracing::warn!(backend = %backend.id, error = %e, "Probe failed");
                }
            }
            metrics::record_backend_health(&backend.id, backend.snapshot().alive());
        }
    }

    async fn probe_one(&self, backend: &Arc<Backend>) -> Result<f64, ProbeError> {
        let uri = backend
            .endpoint
            .join(&self.config.path)
            .map_err(|e| ProbeError::Connection(e.to_string()))?;

        let request = Request::builder()
            .method("GET")
            .uri(uri.as_str())
            .header("user-agent", "pulse-proxy-probe")
            .body(Body::empty())
            .map_err(|e| ProbeError::Connection(e.to_string()))?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let start = Instant::now();

        // a timeout drops the response future, cancelling the probe
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    Ok(start.elapsed().as_secs_f64() * 1000.0)
                } else {
                    Err(ProbeError::Status(response.status()))
                }
            }
            Ok(Err(e)) => Err(ProbeError::Connection(e.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}
