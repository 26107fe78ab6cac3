//! Exponentially weighted moving average primitive.
//!
//! Used identically for latency, loss, and queue-depth smoothing. `None`
//! models "no sample yet": the first sample becomes the average as-is.

/// Default smoothing factor.
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Fold a new sample into a running average.
///
/// Cold start (`prev` is `None` or non-finite) returns the sample unchanged.
/// Otherwise `alpha * sample + (1 - alpha) * prev`; higher alpha favors
/// recent samples.
pub fn ewma(prev: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match prev {
        Some(p) if p.is_finite() => alpha * sample + (1.0 - alpha) * p,
        _ => sample,
    }
}
