//! Testbench Core Library
//!
//! Verification orchestrator for the platform's infrastructure probes:
//! - Loads the probe catalog from a registry
//! - Executes probes through a timeout-bounded client that never fails
//! - Tracks per-probe run state (Idle / Running / Completed)
//! - Aggregates completed results into a pass/warn/fail summary

pub mod aggregator;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod fakes;
pub mod health;
pub mod http;
pub mod metrics;
pub mod obs;
pub mod probe;
pub mod registry;
pub mod state;
pub mod telemetry;

pub use aggregator::{classify, summarize, Classification, Summary};
pub use client::{ExecutorError, ProbeClient, ProbeExecutor};
pub use config::TestbenchConfig;
pub use driver::{Orchestrator, RunAllReport};
pub use error::{Result, TestbenchError};
pub use health::{HealthClient, HealthReport};
pub use http::HttpProbeExecutor;
pub use probe::{Probe, ProbeResult};
pub use registry::{HttpRegistry, ProbeRegistry, StaticRegistry};
pub use state::{RunPhase, RunState, RunStateStore, StoreSnapshot};

pub use metrics::METRICS;
pub use obs::{
    emit_probe_finished, emit_probe_started, emit_registry_loaded, emit_run_all_finished,
    emit_run_all_started, run_all_span,
};
pub use telemetry::init_tracing;

/// Testbench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
