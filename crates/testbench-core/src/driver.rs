//! Probe orchestration: run one probe, or run the whole catalog in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::{classify, Summary};
use crate::client::ProbeClient;
use crate::config::TestbenchConfig;
use crate::error::{Result, TestbenchError};
use crate::metrics::METRICS;
use crate::obs::{
    emit_probe_finished, emit_probe_started, emit_registry_loaded, emit_run_all_finished,
    emit_run_all_started, run_all_span,
};
use crate::probe::{Probe, ProbeResult};
use crate::registry::{HttpRegistry, ProbeRegistry};
use crate::state::{RunStateStore, StoreSnapshot};

/// Outcome of a complete run-all pass.
///
/// Reports completion only; probe failures live in `summary`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunAllReport {
    /// Correlation id for this pass.
    pub run_id: String,

    /// Probes executed, in execution order.
    pub completed: Vec<String>,

    /// Probes skipped because an independent run was already in flight.
    pub skipped: Vec<String>,

    /// Summary over the whole catalog after the pass.
    pub summary: Summary,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

/// Releases the run-all flag however the pass ends.
struct RunAllGuard<'a>(&'a AtomicBool);

impl<'a> RunAllGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TestbenchError::RunInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RunAllGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Records a cancelled result if a `run_one` future is dropped mid-execution,
/// so the probe cannot stay `Running`.
struct InFlight<'a> {
    store: &'a RunStateStore,
    probe_id: &'a str,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(probe_id = %self.probe_id, "probe run dropped before completion");
            let _ = self
                .store
                .record_result(self.probe_id, ProbeResult::cancelled(self.probe_id));
        }
    }
}

/// Verification orchestrator.
pub struct Orchestrator {
    registry: Arc<dyn ProbeRegistry>,
    client: ProbeClient,
    store: Arc<RunStateStore>,
    run_all_active: AtomicBool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("client", &self.client)
            .field("probes", &self.store.len())
            .field("run_all_active", &self.is_run_all_active())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with a fresh, empty store.
    pub fn new(registry: Arc<dyn ProbeRegistry>, client: ProbeClient) -> Self {
        Self::with_store(registry, client, Arc::new(RunStateStore::new()))
    }

    /// Create an orchestrator over an existing store.
    pub fn with_store(
        registry: Arc<dyn ProbeRegistry>,
        client: ProbeClient,
        store: Arc<RunStateStore>,
    ) -> Self {
        Self {
            registry,
            client,
            store,
            run_all_active: AtomicBool::new(false),
        }
    }

    /// Orchestrator wired to the platform API over HTTP.
    pub fn from_config(config: &TestbenchConfig) -> Result<Self> {
        let registry = HttpRegistry::new(config)?;
        let client = ProbeClient::from_config(config)?;
        Ok(Self::new(Arc::new(registry), client))
    }

    pub fn store(&self) -> &Arc<RunStateStore> {
        &self.store
    }

    /// Current snapshot of every probe's state.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Current aggregate summary.
    pub fn summary(&self) -> Summary {
        self.store.summary()
    }

    /// Subscribe to run state changes.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.store.subscribe()
    }

    pub fn is_run_all_active(&self) -> bool {
        self.run_all_active.load(Ordering::Acquire)
    }

    /// Load the catalog into the store and return it (deduplicated, in order).
    pub async fn refresh_registry(&self) -> Result<Vec<Probe>> {
        let probes = self.registry.list().await.map_err(|e| match e {
            TestbenchError::RegistryUnavailable(_) => e,
            other => TestbenchError::RegistryUnavailable(other.to_string()),
        })?;
        let catalog = self.store.register(probes);
        emit_registry_loaded(catalog.len());
        Ok(catalog)
    }

    /// Execute one registered probe and record its result.
    ///
    /// Fails with [`TestbenchError::AlreadyRunning`] if the probe is in
    /// flight, and [`TestbenchError::UnknownProbe`] if it is not in the
    /// loaded catalog. Probe failures are returned as a failed result.
    pub async fn run_one(&self, probe_id: &str) -> Result<ProbeResult> {
        self.store.begin_run(probe_id)?;
        emit_probe_started(probe_id);

        let mut in_flight = InFlight {
            store: self.store.as_ref(),
            probe_id,
            settled: false,
        };
        let result = self.client.execute(probe_id).await;
        in_flight.settle();

        self.store.record_result(probe_id, result.clone())?;
        emit_probe_finished(probe_id, classify(&result), result.latency_ms);
        Ok(result)
    }

    /// Refresh the catalog, then execute every probe strictly one at a time
    /// in catalog order.
    ///
    /// Fails with [`TestbenchError::RunInProgress`] if another pass is
    /// active, and [`TestbenchError::RegistryUnavailable`] (running nothing)
    /// if the catalog cannot be loaded.
    pub async fn run_all(&self) -> Result<RunAllReport> {
        let _guard = RunAllGuard::acquire(&self.run_all_active)?;
        let start = Instant::now();
        let probes = self.refresh_registry().await?;
        let run_id = Uuid::new_v4().to_string();

        let report = self
            .run_sequence(&run_id, probes, start)
            .instrument(run_all_span(&run_id))
            .await;
        Ok(report)
    }

    async fn run_sequence(&self, run_id: &str, probes: Vec<Probe>, start: Instant) -> RunAllReport {
        emit_run_all_started(run_id, probes.len());

        let mut completed = Vec::with_capacity(probes.len());
        let mut skipped = Vec::new();

        for probe in probes {
            match self.run_one(&probe.id).await {
                Ok(_) => completed.push(probe.id),
                Err(TestbenchError::AlreadyRunning { .. }) => {
                    info!(probe_id = %probe.id, "probe already running, skipping");
                    skipped.push(probe.id);
                }
                Err(e) => {
                    warn!(probe_id = %probe.id, error = %e, "probe not run");
                    skipped.push(probe.id);
                }
            }
        }

        let summary = self.store.summary();
        let duration_ms = start.elapsed().as_millis() as u64;
        emit_run_all_finished(run_id, &summary, duration_ms);
        METRICS.inc_runs_completed();
        METRICS.flush();

        RunAllReport {
            run_id: run_id.to_string(),
            completed,
            skipped,
            summary,
            duration_ms,
        }
    }
}
