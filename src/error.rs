//! Error taxonomy for the background estimation tasks.
//!
//! Probe and poll failures are absorbed into per-backend state (loss and
//! queue estimates) and never reach the request path; these types exist so
//! the prober and poller can log and classify what happened. "Unreachable"
//! is derived backend state, not an error value.

use axum::http::StatusCode;
use thiserror::Error;

/// Failure modes of an active health probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("probe connection failed: {0}")]
    Connection(String),

    #[error("probe returned status {0}")]
    Status(StatusCode),
}

/// Failure modes of a passive metrics poll. All of them are best-effort:
/// the backend keeps its last known queue/cpu/memory values.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("poll timed out")]
    Timeout,

    #[error("poll connection failed: {0}")]
    Connection(String),

    #[error("poll returned status {0}")]
    Status(StatusCode),

    #[error("poll payload malformed: {0}")]
    Parse(#[from] serde_json::Error),
}
