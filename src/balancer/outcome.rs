//! Outcome recording.
//!
//! # Responsibilities
//! - Hand the forwarding layer a per-request handle tied to the chosen
//!   backend
//! - Fold the realized outcome (duration, classification) back into the
//!   backend's counters, exactly once
//! - Drive the learned policy's gradient step with the same feature vector
//!   that produced the prediction
//!
//! # Design Decisions
//! - An atomic latch makes completion idempotent; the in-flight counter's
//!   floor-at-zero is a second guard behind it
//! - Dropping an unfinished handle counts as an abort: the slot is released
//!   but the backend is not blamed

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::balancer::backend::Backend;
use crate::balancer::features::FeatureVec;
use crate::balancer::learned::LinearModel;

/// How a forwarded request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Backend answered without server-side fault (non-5xx).
    Success,
    /// Backend answered with a server-side fault (5xx).
    ServerError,
    /// The forward attempt failed at the transport level.
    TransportError,
    /// The request went away before an outcome was observed.
    Aborted,
}

impl Outcome {
    /// Whether the outcome counts against the backend's error rate.
    pub fn is_error(self) -> bool {
        matches!(self, Self::ServerError | Self::TransportError)
    }
}

/// One routing decision: the chosen backend plus the reporting handle the
/// forwarding layer uses to close the loop.
#[derive(Debug)]
pub struct Selection {
    backend: Arc<Backend>,
    score: f64,
    /// Decision-time features, captured so the weight update sees exactly
    /// what the prediction saw. `None` under the static policy.
    features: Option<FeatureVec>,
    model: Option<Arc<LinearModel>>,
    completed: AtomicBool,
}

impl Selection {
    pub(crate) fn new(
        backend: Arc<Backend>,
        score: f64,
        features: Option<FeatureVec>,
        model: Option<Arc<LinearModel>>,
    ) -> Self {
        Self {
            backend,
            score,
            features,
            model,
            completed: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Endpoint the caller should forward to.
    pub fn endpoint(&self) -> &Url {
        &self.backend.endpoint
    }

    /// Score the backend won selection with.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Report the request outcome. Idempotent: duplicate signals (a finish
    /// racing an abort) are absorbed by the latch.
    pub fn complete(&self, duration: Duration, outcome: Outcome) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.backend.end_request();
        self.backend.record_completion(outcome.is_error());

        if outcome == Outcome::Aborted {
            // nothing was observed; no learning signal
            return;
        }
        if let (Some(features), Some(model)) = (&self.features, &self.model) {
            let reward = LinearModel::reward(duration.as_secs_f64() * 1000.0, outcome.is_error());
            model.update(features, reward);
        }
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        if !self.completed.load(Ordering::Acquire) {
            self.complete(Duration::ZERO, Outcome::Aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Arc<Backend> {
        Arc::new(Backend::new(
            "a",
            Url::parse("http://127.0.0.1:3000").unwrap(),
        ))
    }

    #[test]
    fn duplicate_completion_is_absorbed() {
        let b = backend();
        b.begin_request();
        let selection = Selection::new(b.clone(), 1.0, None, None);
        selection.complete(Duration::from_millis(10), Outcome::Success);
        selection.complete(Duration::from_millis(10), Outcome::ServerError);
        drop(selection);

        let snap = b.snapshot();
        assert_eq!(b.active_requests(), 0);
        assert_eq!(snap.stats.request_count, 1);
        // the second (error) signal must not have counted
        assert_eq!(snap.stats.error_request_count, 0);
    }

    #[test]
    fn dropped_selection_releases_slot_without_blame() {
        let b = backend();
        b.begin_request();
        {
            let _selection = Selection::new(b.clone(), 1.0, None, None);
        }
        let snap = b.snapshot();
        assert_eq!(b.active_requests(), 0);
        assert_eq!(snap.stats.error_request_count, 0);
    }

    #[test]
    fn server_error_raises_error_rate() {
        let b = backend();
        b.begin_request();
        Selection::new(b.clone(), 1.0, None, None)
            .complete(Duration::from_millis(5), Outcome::ServerError);
        let snap = b.snapshot();
        assert_eq!(snap.stats.error_request_count, 1);
        assert!((snap.stats.error_rate - 1.0).abs() < 1e-9);
    }
}
