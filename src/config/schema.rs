//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the adaptive proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend server definitions. The set is fixed at startup.
    pub backends: Vec<BackendConfig>,

    /// Active health probe settings.
    pub probe: ProbeConfig,

    /// Passive metrics poll settings.
    pub poll: PollConfig,

    /// Scoring and selection settings.
    pub scoring: ScoringConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds for the proxied path.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// A single upstream server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Stable identifier, unique across the pool.
    pub id: String,

    /// Base URL to forward to (e.g., "http://127.0.0.1:3000").
    pub endpoint: String,
}

/// Active health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Interval between probe sweeps in milliseconds.
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds. A timed-out probe is cancelled
    /// and counted as a failure.
    pub timeout_ms: u64,

    /// Path to probe on each backend.
    pub path: String,

    /// Smoothing factor for latency and loss estimates.
    pub ewma_alpha: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            timeout_ms: 1000,
            path: "/health".to_string(),
            ewma_alpha: 0.2,
        }
    }
}

/// Passive metrics poll configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval between poll sweeps in milliseconds.
    pub interval_ms: u64,

    /// Per-poll timeout in milliseconds.
    pub timeout_ms: u64,

    /// Path to pull backend-reported load signals from.
    pub path: String,

    /// Smoothing factor for the queue-depth estimate.
    pub ewma_alpha: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            timeout_ms: 1000,
            path: "/metrics".to_string(),
            ewma_alpha: 0.2,
        }
    }
}

/// Which scoring strategy drives selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Fixed weighted-sum score with switch hysteresis.
    #[default]
    Static,
    /// Online-learned linear score with epsilon-greedy exploration.
    Learned,
}

/// Scoring and selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Active policy.
    pub policy: PolicyKind,

    /// Weights for the static policy.
    pub static_weights: StaticWeightsConfig,

    /// Minimum probe count before the loss estimate is trusted.
    pub min_probes: u64,

    /// Score margin a challenger must beat the incumbent by to switch.
    pub switch_threshold: f64,

    /// Minimum time between switches in milliseconds.
    pub switch_cooldown_ms: u64,

    /// Gradient step size for the learned policy.
    pub learning_rate: f64,

    /// Exploration probability for the learned policy.
    pub epsilon: f64,

    /// Where the learned weights are persisted. `None` disables persistence.
    pub weights_path: Option<PathBuf>,

    /// Persistence period in milliseconds.
    pub persist_interval_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Static,
            static_weights: StaticWeightsConfig::default(),
            min_probes: 5,
            switch_threshold: 30.0,
            switch_cooldown_ms: 1500,
            learning_rate: 0.05,
            epsilon: 0.2,
            weights_path: None,
            persist_interval_ms: 5000,
        }
    }
}

/// Per-signal penalty weights for the static policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticWeightsConfig {
    /// Points per millisecond of smoothed latency.
    pub latency: f64,

    /// Points per percent of smoothed loss.
    pub loss: f64,

    /// Points per percent of request error rate.
    pub error: f64,

    /// Points per unit of saturated queue pressure.
    pub queue: f64,

    /// Points per in-flight request.
    pub load: f64,
}

impl Default for StaticWeightsConfig {
    fn default() -> Self {
        Self {
            latency: 0.5,
            loss: 10.0,
            error: 100.0,
            queue: 2.0,
            load: 1.0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
