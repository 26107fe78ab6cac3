//! Policy seam between scoring strategies and the selector.
//!
//! The two strategies share the "snapshot in, scalar out, higher is better"
//! contract but differ in how a pick is made (hysteresis vs epsilon-greedy),
//! so the seam is an enum rather than a trait object.

use std::sync::Arc;

use crate::balancer::backend::BackendSnapshot;
use crate::balancer::features::FeatureVec;
use crate::balancer::learned::LinearModel;
use crate::balancer::score::StaticPolicy;
use crate::config::{PolicyKind, ScoringConfig};

/// The active scoring strategy.
#[derive(Debug, Clone)]
pub enum ScoringPolicy {
    Static(StaticPolicy),
    Learned(Arc<LinearModel>),
}

impl ScoringPolicy {
    pub fn from_config(config: &ScoringConfig) -> Self {
        match config.policy {
            PolicyKind::Static => Self::Static(StaticPolicy::new(config)),
            PolicyKind::Learned => Self::Learned(Arc::new(LinearModel::new(config))),
        }
    }

    /// Score a snapshot under the active strategy; higher is better.
    pub fn score(&self, snap: &BackendSnapshot) -> f64 {
        match self {
            Self::Static(policy) => policy.score(snap),
            Self::Learned(model) => model.predict(&FeatureVec::extract(snap)),
        }
    }

    /// The model, when the learned strategy is active.
    pub fn model(&self) -> Option<&Arc<LinearModel>> {
        match self {
            Self::Static(_) => None,
            Self::Learned(model) => Some(model),
        }
    }
}
