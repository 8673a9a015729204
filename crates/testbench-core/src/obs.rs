//! Structured observability hooks for probe and run-all lifecycle events.
//!
//! Events are emitted at `info!` level with an `event` field so log
//! pipelines can filter on `event=probe.finished` and friends.

use tracing::info;

use crate::aggregator::{Classification, Summary};

/// Span tagged with a run-all id, for `Instrument`-ing async work.
pub fn run_all_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("testbench.run_all", run_id = %run_id)
}

/// Emit event: probe execution started.
pub fn emit_probe_started(probe_id: &str) {
    info!(event = "probe.started", probe_id = %probe_id);
}

/// Emit event: probe execution finished with its classification.
pub fn emit_probe_finished(probe_id: &str, classification: Classification, latency_ms: u64) {
    info!(
        event = "probe.finished",
        probe_id = %probe_id,
        status = %classification,
        latency_ms = latency_ms,
    );
}

/// Emit event: registry catalog loaded.
pub fn emit_registry_loaded(probe_count: usize) {
    info!(event = "registry.loaded", probe_count = probe_count);
}

/// Emit event: run-all started over `probe_count` probes.
pub fn emit_run_all_started(run_id: &str, probe_count: usize) {
    info!(event = "run_all.started", run_id = %run_id, probe_count = probe_count);
}

/// Emit event: run-all finished with the aggregate summary.
pub fn emit_run_all_finished(run_id: &str, summary: &Summary, duration_ms: u64) {
    info!(
        event = "run_all.finished",
        run_id = %run_id,
        passed = summary.passed,
        warned = summary.warned,
        failed = summary.failed,
        total = summary.total,
        duration_ms = duration_ms,
    );
}
