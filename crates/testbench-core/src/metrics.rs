//! Global atomic counters for testbench observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run-all).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    probes_executed: AtomicU64,
    probe_timeouts: AtomicU64,
    probe_failures: AtomicU64,
    runs_completed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            probes_executed: AtomicU64::new(0),
            probe_timeouts: AtomicU64::new(0),
            probe_failures: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
        }
    }

    /// Increment the probes-executed counter by one.
    pub fn inc_probes_executed(&self) {
        self.probes_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "probes_executed", "counter incremented");
    }

    /// Increment the probe-timeouts counter by one.
    pub fn inc_probe_timeouts(&self) {
        self.probe_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "probe_timeouts", "counter incremented");
    }

    /// Increment the probe-failures counter by one.
    ///
    /// Counts executor errors and malformed responses, not probes that
    /// reported `passed == false`.
    pub fn inc_probe_failures(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "probe_failures", "counter incremented");
    }

    /// Increment the completed run-all counter by one.
    pub fn inc_runs_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_completed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            probes_executed = self.probes_executed(),
            probe_timeouts = self.probe_timeouts(),
            probe_failures = self.probe_failures(),
            runs_completed = self.runs_completed(),
        );
    }

    pub fn probes_executed(&self) -> u64 {
        self.probes_executed.load(Ordering::Relaxed)
    }

    pub fn probe_timeouts(&self) -> u64 {
        self.probe_timeouts.load(Ordering::Relaxed)
    }

    pub fn probe_failures(&self) -> u64 {
        self.probe_failures.load(Ordering::Relaxed)
    }

    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.probes_executed.store(0, Ordering::Relaxed);
        self.probe_timeouts.store(0, Ordering::Relaxed);
        self.probe_failures.store(0, Ordering::Relaxed);
        self.runs_completed.store(0, Ordering::Relaxed);
    }
}
