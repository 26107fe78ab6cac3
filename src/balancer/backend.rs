//! Per-upstream state record.
//!
//! # Responsibilities
//! - Hold one backend's identity and its observed health/load state
//! - Tolerate concurrent updates from prober, poller, and request path
//! - Hand out consistent snapshots for scoring
//!
//! # Design Decisions
//! - Identity is immutable; counters and estimates live behind one Mutex so
//!   invariants like `total_probes == successes + failures` hold even while
//!   an update is in progress. Critical sections are pure arithmetic.
//! - The in-flight counter is a separate atomic with a CAS floor at zero,
//!   so a duplicate completion signal can never drive it negative.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::balancer::ewma::ewma;

/// Mutable estimation state for one backend. Guarded by `Backend::stats`.
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    /// Last probe round-trip in milliseconds; `None` means the last probe
    /// failed or none has run yet (the backend is unreachable).
    pub latency_raw_ms: Option<f64>,
    /// Smoothed probe latency; undefined until the first successful probe.
    pub latency_ewma_ms: Option<f64>,
    /// Smoothed loss estimate in [0, 1]; undefined until the first probe.
    pub loss_ewma: Option<f64>,
    pub probe_successes: u64,
    pub probe_failures: u64,
    pub total_probes: u64,
    pub request_count: u64,
    pub error_request_count: u64,
    pub error_rate: f64,
    /// Backend-reported pending-work depth, last value wins.
    pub queue_len: f64,
    pub queue_len_ewma: Option<f64>,
    pub cpu_busy_ms: f64,
    pub memory_used_bytes: f64,
}

/// A single upstream server.
#[derive(Debug)]
pub struct Backend {
    /// Stable identifier.
    pub id: String,
    /// Base URL requests are forwarded to.
    pub endpoint: Url,
    stats: Mutex<BackendStats>,
    active_requests: AtomicUsize,
}

impl Backend {
    pub fn new(id: impl Into<String>, endpoint: Url) -> Self {
        Self {
            id: id.into(),
            endpoint,
            stats: Mutex::new(BackendStats::default()),
            active_requests: AtomicUsize::new(0),
        }
    }

    /// Current in-flight request count.
    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Record a successful probe round-trip.
    pub fn record_probe_success(&self, rtt_ms: f64, alpha: f64) {
        let mut stats = self.lock_stats();
        stats.latency_raw_ms = Some(rtt_ms);
        stats.latency_ewma_ms = Some(ewma(stats.latency_ewma_ms, rtt_ms, alpha));
        stats.probe_successes += 1;
        stats.total_probes = stats.probe_successes + stats.probe_failures;
        // a success is a zero-loss sample
        stats.loss_ewma = Some(ewma(stats.loss_ewma, 0.0, alpha));
    }

    /// Record a failed or timed-out probe.
    pub fn record_probe_failure(&self, alpha: f64) {
        let mut stats = self.lock_stats();
        stats.latency_raw_ms = None;
        stats.probe_failures += 1;
        stats.total_probes = stats.probe_successes + stats.probe_failures;
        // a failure is a full-loss sample
        stats.loss_ewma = Some(ewma(stats.loss_ewma, 1.0, alpha));
    }

    /// Fold in a backend-reported metrics payload. Resource fields retain
    /// their previous value when absent from the payload.
    pub fn record_poll(
        &self,
        queue_len: f64,
        cpu_busy_ms: Option<f64>,
        memory_used_bytes: Option<f64>,
        alpha: f64,
    ) {
        let mut stats = self.lock_stats();
        stats.queue_len = queue_len;
        stats.queue_len_ewma = Some(ewma(stats.queue_len_ewma, queue_len, alpha));
        if let Some(cpu) = cpu_busy_ms {
            stats.cpu_busy_ms = cpu;
        }
        if let Some(mem) = memory_used_bytes {
            stats.memory_used_bytes = mem;
        }
    }

    /// Admit a request: bump the in-flight and total counters.
    pub fn begin_request(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        let mut stats = self.lock_stats();
        stats.request_count += 1;
    }

    /// Release an in-flight slot. Floors at zero so duplicate completion
    /// signals (e.g. both a "finished" and an "aborted" event) are harmless.
    pub fn end_request(&self) {
        let mut prev = self.active_requests.load(Ordering::Relaxed);
        loop {
            if prev == 0 {
                return;
            }
            match self.active_requests.compare_exchange_weak(
                prev,
                prev - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(x) => prev = x,
            }
        }
    }

    /// Record the realized outcome of a completed request.
    pub fn record_completion(&self, error: bool) {
        let mut stats = self.lock_stats();
        if error {
            stats.error_request_count += 1;
        }
        if stats.request_count > 0 {
            stats.error_rate = stats.error_request_count as f64 / stats.request_count as f64;
        }
    }

    /// Take a consistent plain-data copy of this record for scoring or the
    /// stats surface.
    pub fn snapshot(&self) -> BackendSnapshot {
        let stats = self.lock_stats().clone();
        BackendSnapshot {
            id: self.id.clone(),
            endpoint: self.endpoint.clone(),
            active_requests: self.active_requests.load(Ordering::Relaxed),
            stats,
        }
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, BackendStats> {
        // the lock only guards arithmetic; a poisoned lock means a panic
        // mid-update, and the estimates are still the best state we have
        match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Point-in-time copy of a backend's state.
#[derive(Debug, Clone)]
pub struct BackendSnapshot {
    pub id: String,
    pub endpoint: Url,
    pub active_requests: usize,
    pub stats: BackendStats,
}

impl BackendSnapshot {
    /// A backend is alive when its most recent probe succeeded.
    pub fn alive(&self) -> bool {
        self.stats.latency_raw_ms.is_some()
    }

    /// Smoothed loss as a percentage. Reads 0 before any probe has run and
    /// 100 when the very first probe failed.
    pub fn loss_percent(&self) -> f64 {
        self.stats.loss_ewma.map(|l| l * 100.0).unwrap_or(0.0)
    }
}
