//! Backend selection.
//!
//! # Responsibilities
//! - Turn current backend state into exactly one routing decision
//! - Damp oscillation between near-equal backends (static policy)
//! - Explore uniformly at random with probability epsilon (learned policy)
//!
//! # Design Decisions
//! - Selection reads snapshots only; it never touches the network
//! - Hysteresis needs both a score margin and an elapsed cooldown before a
//!   switch; a dead incumbent is replaced immediately regardless
//! - Exploration bypasses hysteresis so the learning signal stays unbiased
//! - The RNG is injected and seedable so exploration is reproducible

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::balancer::backend::BackendSnapshot;
use crate::balancer::features::FeatureVec;
use crate::balancer::learned::LinearModel;
use crate::balancer::outcome::Selection;
use crate::balancer::policy::ScoringPolicy;
use crate::balancer::score::StaticPolicy;
use crate::balancer::store::BackendStore;
use crate::config::ScoringConfig;

/// Remembered identity of the current favorite and when we last moved.
#[derive(Debug, Default)]
struct SwitchState {
    incumbent: Option<String>,
    last_switch: Option<Instant>,
}

/// Picks one backend per request from current scores.
#[derive(Debug)]
pub struct Selector {
    store: Arc<BackendStore>,
    policy: ScoringPolicy,
    switch_threshold: f64,
    cooldown: Duration,
    state: Mutex<SwitchState>,
    rng: Mutex<StdRng>,
}

impl Selector {
    pub fn new(store: Arc<BackendStore>, policy: ScoringPolicy, config: &ScoringConfig) -> Self {
        Self::with_rng(store, policy, config, StdRng::from_entropy())
    }

    /// Construct with an explicit RNG, for reproducible exploration.
    pub fn with_rng(
        store: Arc<BackendStore>,
        policy: ScoringPolicy,
        config: &ScoringConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            policy,
            switch_threshold: config.switch_threshold,
            cooldown: Duration::from_millis(config.switch_cooldown_ms),
            state: Mutex::new(SwitchState::default()),
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &Arc<BackendStore> {
        &self.store
    }

    /// Score a snapshot under the active policy (stats surface).
    pub fn score(&self, snap: &BackendSnapshot) -> f64 {
        self.policy.score(snap)
    }

    /// Choose a backend for one request. Returns `None` only for an empty
    /// pool; a pool of dead backends still yields a choice (fail open).
    /// The chosen backend's in-flight and request counters are bumped
    /// before the handle is returned.
    pub fn select(&self) -> Option<Selection> {
        let backends = self.store.backends();
        if backends.is_empty() {
            return None;
        }
        let snaps: Vec<BackendSnapshot> = backends.iter().map(|b| b.snapshot()).collect();

        let (index, score, features) = match &self.policy {
            ScoringPolicy::Static(policy) => {
                let (index, score) = self.pick_static(policy, &snaps);
                (index, score, None)
            }
            ScoringPolicy::Learned(model) => self.pick_learned(model, &snaps),
        };

        let backend = backends[index].clone();
        backend.begin_request();

        tracing::debug!(
            backend = %backend.id,
            score,
            active = backend.active_requests(),
            "Selected backend"
        );

        Some(Selection::new(
            backend,
            score,
            features,
            self.policy.model().cloned(),
        ))
    }

    /// Argmax with hysteresis: the incumbent keeps its seat unless the
    /// challenger clears the margin and the cooldown has elapsed.
    fn pick_static(&self, policy: &StaticPolicy, snaps: &[BackendSnapshot]) -> (usize, f64) {
        let scores: Vec<f64> = snaps.iter().map(|s| policy.score(s)).collect();
        let best = argmax(&scores);
        let now = Instant::now();

        let mut state = lock(&self.state);
        let incumbent = state
            .incumbent
            .as_deref()
            .and_then(|id| snaps.iter().position(|s| s.id == id));

        let chosen = match incumbent {
            Some(inc) if inc != best => {
                if !snaps[inc].alive() {
                    // never cling to a dead incumbent
                    best
                } else if state
                    .last_switch
                    .is_some_and(|t| now.duration_since(t) < self.cooldown)
                {
                    inc
                } else if scores[best] > scores[inc] + self.switch_threshold {
                    best
                } else {
                    inc
                }
            }
            Some(inc) => inc,
            None => best,
        };

        if state.incumbent.as_deref() != Some(snaps[chosen].id.as_str()) {
            state.incumbent = Some(snaps[chosen].id.clone());
            state.last_switch = Some(now);
        }

        (chosen, scores[chosen])
    }

    /// Epsilon-greedy: explore uniformly among alive backends (full pool if
    /// none are alive), otherwise exploit the highest predicted score.
    fn pick_learned(
        &self,
        model: &Arc<LinearModel>,
        snaps: &[BackendSnapshot],
    ) -> (usize, f64, Option<FeatureVec>) {
        let features: Vec<FeatureVec> = snaps.iter().map(FeatureVec::extract).collect();
        let scores: Vec<f64> = features.iter().map(|f| model.predict(f)).collect();

        let index = {
            let mut rng = lock(&self.rng);
            if rng.gen::<f64>() < model.epsilon() {
                let alive: Vec<usize> = snaps
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.alive())
                    .map(|(i, _)| i)
                    .collect();
                if alive.is_empty() {
                    rng.gen_range(0..snaps.len())
                } else {
                    alive[rng.gen_range(0..alive.len())]
                }
            } else {
                argmax(&scores)
            }
        };

        (index, scores[index], Some(features[index]))
    }
}

/// First index of the maximum score. Tolerates `-inf` entries; an all-`-inf`
/// slice yields index 0.
fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate().skip(1) {
        if *s > scores[best] {
            best = i;
        }
    }
    best
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
