//! Online-learned linear scoring policy.
//!
//! Predicts a backend's desirability as the dot product of its feature
//! vector and a learned weight vector. After each completed request the
//! chosen backend's weights take one gradient step toward the realized
//! reward. Weights are periodically persisted as a flat JSON map so a
//! restart resumes close to where it left off; a missing or corrupt file
//! only costs decision quality, never startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::balancer::features::FeatureVec;
use crate::config::ScoringConfig;

/// Reward granted to an instantaneous, successful request.
const BASE_REWARD: f64 = 1.0;
/// Milliseconds of latency that cost one full reward point.
const LATENCY_PENALTY_SCALE_MS: f64 = 1000.0;
/// Extra penalty when the request failed server-side.
const ERROR_PENALTY: f64 = 2.0;

/// One weight per feature, in the same canonical order as
/// [`FeatureVec::components`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelWeights {
    pub bias: f64,
    pub latency: f64,
    pub loss: f64,
    pub error: f64,
    pub load: f64,
    pub queue: f64,
    pub cpu: f64,
    pub memory: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        // pessimistic priors: every load/health signal hurts
        Self {
            bias: 1.0,
            latency: -1.0,
            loss: -1.0,
            error: -1.0,
            load: -0.5,
            queue: -0.5,
            cpu: -0.25,
            memory: -0.1,
        }
    }
}

impl ModelWeights {
    /// Flat name → weight map, the persisted representation.
    pub fn to_map(&self) -> HashMap<String, f64> {
        let mut map = HashMap::new();
        for (name, value) in self.components() {
            map.insert(name.to_string(), value);
        }
        map
    }

    /// Rebuild from a flat map. Missing keys keep their default so a file
    /// written by an older feature set still loads; unknown keys are ignored.
    pub fn from_map(map: &HashMap<String, f64>) -> Self {
        let mut weights = Self::default();
        for (name, slot) in weights.components_mut() {
            if let Some(v) = map.get(name) {
                if v.is_finite() {
                    *slot = *v;
                }
            }
        }
        weights
    }

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

    fn components_mut(&mut self) -> [(&'static str, &mut f64); 8] {
        [
            ("bias", &mut self.bias),
            ("latency", &mut self.latency),
            ("loss", &mut self.loss),
            ("error", &mut self.error),
            ("load", &mut self.load),
            ("queue", &mut self.queue),
            ("cpu", &mut self.cpu),
            ("memory", &mut self.memory),
        ]
    }

    fn dot(&self, features: &FeatureVec) -> f64 {
        self.bias * features.bias
            + self.latency * features.latency
            + self.loss * features.loss
            + self.error * features.error
            + self.load * features.load
            + self.queue * features.queue
            + self.cpu * features.cpu
            + self.memory * features.memory
    }
}

/// The learned linear model. Weight updates are serialized through the
/// inner lock, so concurrent request completions never lose a step.
#[derive(Debug)]
pub struct LinearModel {
    weights: Mutex<ModelWeights>,
    learning_rate: f64,
    epsilon: f64,
}

impl LinearModel {
    pub fn new(config: &ScoringConfig) -> Self {
        let weights = match &config.weights_path {
            Some(path) => load_weights(path),
            None => ModelWeights::default(),
        };
        Self {
            weights: Mutex::new(weights),
            learning_rate: config.learning_rate,
            epsilon: config.epsilon,
        }
    }

    #[cfg(test)]
    pub fn with_weights(weights: ModelWeights, learning_rate: f64, epsilon: f64) -> Self {
        Self {
            weights: Mutex::new(weights),
            learning_rate,
            epsilon,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Predicted desirability of a feature vector; higher is better.
    pub fn predict(&self, features: &FeatureVec) -> f64 {
        self.lock().dot(features)
    }

    /// Realized reward for a completed request. Strictly decreasing in both
    /// latency and error occurrence.
    pub fn reward(duration_ms: f64, error: bool) -> f64 {
        let mut reward = BASE_REWARD - duration_ms / LATENCY_PENALTY_SCALE_MS;
        if error {
            reward -= ERROR_PENALTY;
        }
        reward
    }

    /// One gradient-descent step: `w += lr * (reward - prediction) * f`.
    /// The prediction is recomputed from the decision-time feature vector
    /// under the lock, so concurrent updates compose instead of clobbering.
    pub fn update(&self, features: &FeatureVec, reward: f64) {
        if !reward.is_finite() {
            return;
        }
        let mut weights = self.lock();
        let error = reward - weights.dot(features);
        let step = self.learning_rate * error;
        weights.bias += step * features.bias;
        weights.latency += step * features.latency;
        weights.loss += step * features.loss;
        weights.error += step * features.error;
        weights.load += step * features.load;
        weights.queue += step * features.queue;
        weights.cpu += step * features.cpu;
        weights.memory += step * features.memory;
    }

    /// Copy of the current weights.
    pub fn weights(&self) -> ModelWeights {
        *self.lock()
    }

    /// Write the weights to `path` as a flat JSON map.
    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        let map = self.weights().to_map();
        let json = serde_json::to_string_pretty(&map)?;
        std::fs::write(path, json)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ModelWeights> {
        match self.weights.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Load persisted weights, falling back to defaults on any problem.
fn load_weights(path: &Path) -> ModelWeights {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<HashMap<String, f64>>(&content) {
            Ok(map) => {
                tracing::info!(path = %path.display(), "Loaded learned weights");
                ModelWeights::from_map(&map)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt weight file, using default weights");
                ModelWeights::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No weight file yet, using default weights");
            ModelWeights::default()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read weight file, using default weights");
            ModelWeights::default()
        }
    }
}

/// Periodically persist the model until shutdown. Failures are logged and
/// learning continues in memory.
pub async fn run_persistence(
    model: Arc<LinearModel>,
    path: PathBuf,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = model.persist(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to persist learned weights");
                }
            }
            _ = shutdown.recv() => {
                // final write so a clean shutdown keeps the latest weights
                if let Err(e) = model.persist(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to persist learned weights at shutdown");
                }
                break;
            }
        }
    }
}
