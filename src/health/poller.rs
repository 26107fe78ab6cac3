//! Passive metrics polling.
//!
//! # Responsibilities
//! - Periodically pull backend-reported load signals (queue depth, cpu,
//!   memory) from each backend's metrics endpoint
//! - Fold them into the state store, last value wins, queue depth smoothed
//!
//! # Design Decisions
//! - Strictly best-effort: any failure leaves the last known values in
//!   place and is logged at debug level only

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::balancer::backend::Backend;
use crate::balancer::store::BackendStore;
use crate::config::PollConfig;
use crate::error::PollError;

/// Largest metrics payload we are willing to buffer.
const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Backend-reported load signals. Only `queueLen` is required; backends are
/// free to omit the rest.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    pub queue_len: f64,
    #[serde(default)]
    pub cpu_busy_ms: Option<f64>,
    #[serde(default)]
    pub mem_rss: Option<f64>,
    #[serde(default)]
    pub heap_used: Option<f64>,
}

impl MetricsPayload {
    /// Best available memory figure: resident set if reported, else heap.
    fn memory_used_bytes(&self) -> Option<f64> {
        self.mem_rss.or(self.heap_used)
    }
}

pub struct MetricsPoller {
    store: Arc<BackendStore>,
    config: PollConfig,
    client: Client<HttpConnector, Body>,
}

impl MetricsPoller {
    pub fn new(store: Arc<BackendStore>, config: PollConfig) -> Self {
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
            path = %self.config.path,
            "Metrics poller starting"
        );

        let mut ticker = time::interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Metrics poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Poll every backend once; sweeps never overlap.
    pub async fn sweep(&self) {
        for backend in self.store.backends() {
            match self.poll_one(backend).await {
                Ok(payload) => {
                    backend.record_poll(
                        payload.queue_len,
                        payload.cpu_busy_ms,
                        payload.memory_used_bytes(),
                        self.config.ewma_alpha,
                    );
                }
                Err(e) => {
                    // best-effort signal; keep the last known values
                    tracing::debug!(backend = %backend.id, error = %e, "Metrics poll ignored");
                }
            }
        }
    }

    async fn poll_one(&self, backend: &Arc<Backend>) -> Result<MetricsPayload, PollError> {
        let uri = backend
            .endpoint
            .join(&self.config.path)
            .map_err(|e| PollError::Connection(e.to_string()))?;

        let request = Request::builder()
            .method("GET")
            .uri(uri.as_str())
            .header("user-agent", "pulse-proxy-poll")
            .body(Body::empty())
            .map_err(|e| PollError::Connection(e.to_string()))?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let response = match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(PollError::Connection(e.to_string())),
            Err(_) => return Err(PollError::Timeout),
        };

        if !response.status().is_success() {
            return Err(PollError::Status(response.status()));
        }

        let body = Body::new(response.into_body());
        let bytes = match time::timeout(timeout, axum::body::to_bytes(body, MAX_PAYLOAD_BYTES)).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(PollError::Connection(e.to_string())),
            Err(_) => return Err(PollError::Timeout),
        };

        Ok(serde_json::from_slice(&bytes)?)
    }
}
