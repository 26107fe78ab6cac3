//! Feature extraction for the learned policy.
//!
//! Each backend snapshot is reduced to a fixed vector of features squashed
//! into roughly [0, 1], plus a constant bias. The set is strongly typed:
//! one named field per feature, iterated through an explicit accessor list
//! rather than any dynamic key enumeration.

use crate::balancer::backend::BackendSnapshot;

/// Latency scale for the squash; ~300ms maps to tanh(1).
const LATENCY_SCALE_MS: f64 = 300.0;
/// Latency charged when the backend is unreachable or unprobed.
const UNREACHABLE_LATENCY_MS: f64 = 10_000.0;
const QUEUE_SCALE: f64 = 50.0;
const LOAD_SCALE: f64 = 10.0;
const CPU_SCALE_MS: f64 = 1000.0;
const MEMORY_SCALE_BYTES: f64 = 1024.0 * 1024.0 * 1024.0;

/// Feature names, in the same order as [`FeatureVec::components`]. Also the
/// keys of the persisted weight file.
pub const FEATURE_NAMES: [&str; 8] = [
    "bias", "latency", "loss", "error", "load", "queue", "cpu", "memory",
];

/// One normalized observation of a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVec {
    pub bias: f64,
    pub latency: f64,
    pub loss: f64,
    pub error: f64,
    pub load: f64,
    pub queue: f64,
    pub cpu: f64,
    pub memory: f64,
}

impl FeatureVec {
    /// Extract features from a snapshot. Every component is finite.
    pub fn extract(snap: &BackendSnapshot) -> Self {
        // a live record always carries a smoothed sample; anything else gets
        // the saturating penalty
        let latency_ms = match snap.stats.latency_ewma_ms {
            Some(ms) if snap.alive() => ms,
            _ => UNREACHABLE_LATENCY_MS,
        };
        let queue = snap.stats.queue_len_ewma.unwrap_or(snap.stats.queue_len);

        Self {
            bias: 1.0,
            latency: squash(latency_ms / LATENCY_SCALE_MS),
            loss: clamp_unit(snap.stats.loss_ewma.unwrap_or(0.0)),
            error: clamp_unit(snap.stats.error_rate),
            load: squash(snap.active_requests as f64 / LOAD_SCALE),
            queue: squash(queue / QUEUE_SCALE),
            cpu: squash(snap.stats.cpu_busy_ms / CPU_SCALE_MS),
            memory: squash(snap.stats.memory_used_bytes / MEMORY_SCALE_BYTES),
        }
    }

    /// The features paired with their names, in canonical order.
    pub fn components(&self) -> [(&'static str, f64); 8] {
        [
            ("bias", self.bias),
            ("latency", self.latency),
            ("loss", self.loss),
            ("error", self.error),
            ("load", self.load),
            ("queue", self.queue),
            ("cpu", self.cpu),
            ("memory", self.memory),
        ]
    }
}

/// Saturating squash into [0, 1); non-finite inputs saturate to 1.
fn squash(x: f64) -> f64 {
    if x.is_finite() {
        x.max(0.0).tanh()
    } else {
        1.0
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::backend::Backend;
    use url::Url;

    #[test]
    fn features_are_finite_and_bounded() {
        let b = Backend::new("a", Url::parse("http://127.0.0.1:3000").unwrap());
        b.record_probe_failure(0.2);
        b.record_poll(f64::NAN, Some(f64::INFINITY), None, 0.2);
        let f = FeatureVec::extract(&b.snapshot());
        for (name, value) in f.components() {
            assert!(value.is_finite(), "{name} not finite");
            assert!((0.0..=1.0).contains(&value), "{name} out of range: {value}");
        }
    }

    #[test]
    fn unreachable_saturates_latency() {
        let b = Backend::new("a", Url::parse("http://127.0.0.1:3000").unwrap());
        b.record_probe_success(20.0, 0.2);
        let healthy = FeatureVec::extract(&b.snapshot());
        b.record_probe_failure(0.2);
        let dead = FeatureVec::extract(&b.snapshot());
        assert!(dead.latency > 0.99);
        assert!(healthy.latency < 0.1);
    }
}
