//! Background estimation tasks.
//!
//! # Data Flow
//! ```text
//! prober.rs: periodic GET /health per backend
//!     → latency + loss EWMAs in the state store
//!
//! poller.rs: periodic GET /metrics per backend
//!     → queue depth + resource usage in the state store
//! ```
//!
//! # Design Decisions
//! - Both tasks run on their own timers, independent of traffic
//! - A sweep finishes before the next tick is honored, so probes and polls
//!   never pile up on a slow backend
//! - Failures are absorbed into state; nothing here is fatal

pub mod poller;
pub mod prober;

pub use poller::MetricsPoller;
pub use prober::HealthProber;
