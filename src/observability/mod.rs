//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`, level from config or `RUST_LOG`
//! - Metrics are cheap atomic updates, exposed over a Prometheus endpoint
//! - Degraded backends surface through `/stats` and gauges, never through
//!   hard failures

pub mod logging;
pub mod metrics;
