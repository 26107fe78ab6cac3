//! Adaptive backend-selection reverse proxy.
//!
//! Fronts a small, fixed pool of upstream servers and continuously estimates
//! each one's health and load from active probes (`/health`) and passive
//! metrics pulls (`/metrics`). Every incoming request is routed to the
//! backend with the best desirability score, with hysteresis to avoid
//! flapping between near-equal backends. Scoring is pluggable: a fixed
//! weighted-sum policy or an online-learned linear policy that adjusts its
//! weights from realized request outcomes.

pub mod balancer;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
