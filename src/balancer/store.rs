//! Backend state store.
//!
//! # Responsibilities
//! - Own every `Backend` record for the lifetime of the process
//! - Provide lookup and snapshotting to the prober, poller, and selector
//!
//! # Design Decisions
//! - Topology is static: records are created at startup and never removed,
//!   so the collection itself needs no synchronization, only the records do

use std::sync::Arc;
use url::Url;

use crate::balancer::backend::{Backend, BackendSnapshot};
use crate::config::BackendConfig;

/// Owns the fixed pool of backend records.
#[derive(Debug)]
pub struct BackendStore {
    backends: Vec<Arc<Backend>>,
}

impl BackendStore {
    /// Build the pool from configuration. Unparseable endpoints are skipped
    /// with a warning; validation normally rejects them before this point.
    pub fn from_config(configs: &[BackendConfig]) -> Self {
        let mut backends = Vec::with_capacity(configs.len());
        for config in configs {
            match Url::parse(&config.endpoint) {
                Ok(endpoint) => backends.push(Arc::new(Backend::new(&config.id, endpoint))),
                Err(e) => {
                    tracing::warn!(id = %config.id, endpoint = %config.endpoint, error = %e, "Skipping backend with invalid endpoint");
                }
            }
        }
        Self { backends }
    }

    /// Build a pool directly from records (tests).
    pub fn from_backends(backends: Vec<Arc<Backend>>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn get(&self, id: &str) -> Option<Arc<Backend>> {
        self.backends.iter().find(|b| b.id == id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Snapshot every record for scoring or the stats surface.
    pub fn snapshots(&self) -> Vec<BackendSnapshot> {
        self.backends.iter().map(|b| b.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_endpoints_are_skipped() {
        let store = BackendStore::from_config(&[
            BackendConfig {
                id: "good".into(),
                endpoint: "http://127.0.0.1:3000".into(),
            },
            BackendConfig {
                id: "bad".into(),
                endpoint: "::/not-a-url".into(),
            },
        ]);
        assert_eq!(store.backends().len(), 1);
        assert!(store.get("good").is_some());
        assert!(store.get("bad").is_none());
    }
}
