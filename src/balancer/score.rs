//! Static weighted scoring policy.
//!
//! Maps a backend snapshot to a scalar where higher is better. An
//! unreachable backend scores negative infinity so it always loses to any
//! reachable one, yet still ranks (fail open) when the whole pool is down.

use crate::balancer::backend::BackendSnapshot;
use crate::config::schema::StaticWeightsConfig;
use crate::config::ScoringConfig;

/// Starting score before penalties.
pub const BASE_SCORE: f64 = 1000.0;

/// Queue depth at which the saturating normalization reaches ~76%.
const QUEUE_SCALE: f64 = 50.0;

/// Fixed weighted-sum policy.
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    weights: StaticWeightsConfig,
    min_probes: u64,
}

impl StaticPolicy {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            weights: config.static_weights.clone(),
            min_probes: config.min_probes,
        }
    }

    /// Score a snapshot; higher is better.
    pub fn score(&self, snap: &BackendSnapshot) -> f64 {
        // a dead backend may still carry a smoothed latency from before it
        // went down, so reachability is checked first
        let latency = match snap.stats.latency_ewma_ms {
            Some(ms) if snap.alive() => ms,
            _ => return f64::NEG_INFINITY,
        };

        // don't trust loss until we have enough probes
        let loss_percent = if snap.stats.total_probes >= self.min_probes {
            snap.loss_percent()
        } else {
            0.0
        };

        // saturating queue pressure: a runaway queue costs a bounded
        // QUEUE_SCALE * w_queue points, never more
        let queue = snap.stats.queue_len_ewma.unwrap_or(snap.stats.queue_len);
        let queue_pressure = (queue / QUEUE_SCALE).tanh() * QUEUE_SCALE;

        BASE_SCORE
            - self.weights.latency * latency
            - self.weights.loss * loss_percent
            - self.weights.error * snap.stats.error_rate * 100.0
            - self.weights.queue * queue_pressure
            - self.weights.load * snap.active_requests as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::backend::Backend;
    use url::Url;

    fn probed_backend(id: &str, rtt_ms: f64) -> Backend {
        let b = Backend::new(id, Url::parse("http://127.0.0.1:3000").unwrap());
        b.record_probe_success(rtt_ms, 0.2);
        b
    }

    fn policy() -> StaticPolicy {
        StaticPolicy::new(&ScoringConfig::default())
    }

    #[test]
    fn unreachable_scores_negative_infinity() {
        let b = Backend::new("down", Url::parse("http://127.0.0.1:3000").unwrap());
        b.record_probe_failure(0.2);
        assert_eq!(policy().score(&b.snapshot()), f64::NEG_INFINITY);
    }

    #[test]
    fn retained_latency_history_does_not_resurrect_a_dead_backend() {
        let b = probed_backend("flapper", 20.0);
        b.record_probe_failure(0.2);
        // the ewma survives the failure, but the record is unreachable
        assert!(b.snapshot().stats.latency_ewma_ms.is_some());
        assert_eq!(policy().score(&b.snapshot()), f64::NEG_INFINITY);
    }

    #[test]
    fn load_penalty_orders_identical_backends() {
        let idle = probed_backend("idle", 50.0);
        let busy = probed_backend("busy", 50.0);
        for _ in 0..20 {
            busy.begin_request();
        }
        let p = policy();
        assert!(p.score(&idle.snapshot()) > p.score(&busy.snapshot()));
    }

    #[test]
    fn loss_is_ignored_below_min_probes() {
        let b = probed_backend("a", 20.0);
        b.record_probe_failure(0.2);
        b.record_probe_success(20.0, 0.2);
        // 3 probes < min_probes 5: loss must not contribute
        let lossy = policy().score(&b.snapshot());
        let clean = probed_backend("b", 20.0);
        let baseline = policy().score(&clean.snapshot());
        // only latency ewma differs slightly; loss would cost >100 points
        assert!((lossy - baseline).abs() < 50.0);

        b.record_probe_success(20.0, 0.2);
        b.record_probe_success(20.0, 0.2);
        // now 5 probes: the smoothed loss bites
        assert!(policy().score(&b.snapshot()) < lossy - 10.0);
    }

    #[test]
    fn queue_penalty_saturates() {
        let calm = probed_backend("calm", 20.0);
        let swamped = probed_backend("swamped", 20.0);
        swamped.record_poll(1_000_000.0, None, None, 1.0);
        let p = policy();
        let gap = p.score(&calm.snapshot()) - p.score(&swamped.snapshot());
        assert!(gap > 0.0);
        // bounded by w_queue * QUEUE_SCALE
        assert!(gap <= 2.0 * QUEUE_SCALE + 1e-9);
    }

    #[test]
    fn faster_backend_wins() {
        let fast = probed_backend("fast", 20.0);
        let slow = probed_backend("slow", 300.0);
        let p = policy();
        assert!(p.score(&fast.snapshot()) > p.score(&slow.snapshot()));
    }
}
