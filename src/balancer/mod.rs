//! Adaptive backend-selection subsystem.
//!
//! # Data Flow
//! ```text
//! prober / poller ──▶ backend.rs (per-record state, EWMA smoothing)
//!                         │
//! request arrives ──▶ selector.rs
//!                         │ snapshots from store.rs
//!                         ▼
//!                    score.rs (static weighted policy)
//!                 or learned.rs (online linear model, epsilon-greedy)
//!                         │
//!                         ▼
//!                    Selection handle → forwarding layer
//!                         │ request completes
//!                         ▼
//!                    outcome.rs (counters + gradient step)
//! ```
//!
//! # Design Decisions
//! - One lock per backend record; multi-field invariants never tear
//! - Selection reads a plain-data snapshot, never blocks on I/O
//! - Hysteresis (margin + cooldown) damps switching under noisy scores
//! - Exploration bypasses hysteresis so the learning signal stays unbiased

pub mod backend;
pub mod ewma;
pub mod features;
pub mod learned;
pub mod outcome;
pub mod policy;
pub mod score;
pub mod selector;
pub mod store;

pub use backend::{Backend, BackendSnapshot};
pub use learned::LinearModel;
pub use outcome::{Outcome, Selection};
pub use policy::ScoringPolicy;
pub use score::StaticPolicy;
pub use selector::Selector;
pub use store::BackendStore;
