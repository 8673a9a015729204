//! Per-probe run state machine with change notification.
//!
//! Transitions:
//! - `Idle -> Running` via [`RunStateStore::begin_run`]
//! - `Running -> Completed` via [`RunStateStore::record_result`]
//! - `Completed -> Running` on a rerun; the old result rides along in
//!   `Running::previous` until the new one lands
//!
//! There is no transition back to `Idle`. Every mutation publishes a fresh
//! [`StoreSnapshot`] on a `tokio::sync::watch` channel.
//!
//! A probe dropped from the catalog while `Running` is held aside until its
//! run settles. If a reload brings it back first, it comes back `Running`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::aggregator::{summarize, Summary};
use crate::error::{Result, TestbenchError};
use crate::probe::{Probe, ProbeResult};

/// Lifecycle phase of a single probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    /// Registered, never run this session.
    Idle,

    /// Execution in flight.
    Running {
        started_at: DateTime<Utc>,
        /// Result of the last completed run, kept until the new one lands.
        previous: Option<ProbeResult>,
    },

    /// Last execution finished with this result.
    Completed(ProbeResult),
}

impl RunPhase {
    /// Short phase name.
    pub fn name(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Running { .. } => "running",
            RunPhase::Completed(_) => "completed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunPhase::Running { .. })
    }

    /// The result when `Completed`, otherwise `None`.
    pub fn result(&self) -> Option<&ProbeResult> {
        match self {
            RunPhase::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// Most recent result, including the one shown while a rerun is in flight.
    pub fn latest_result(&self) -> Option<&ProbeResult> {
        match self {
            RunPhase::Idle => None,
            RunPhase::Running { previous, .. } => previous.as_ref(),
            RunPhase::Completed(result) => Some(result),
        }
    }
}

/// Run state of one registered probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub probe: Probe,
    #[serde(flatten)]
    pub phase: RunPhase,
    /// Number of executions started this session.
    pub runs: u64,
}

impl RunState {
    fn idle(probe: Probe) -> Self {
        Self {
            probe,
            phase: RunPhase::Idle,
            runs: 0,
        }
    }
}

/// Point-in-time copy of every probe's state, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    /// Incremented on every mutation.
    pub revision: u64,
    pub entries: Vec<RunState>,
}

impl StoreSnapshot {
    /// Look up one probe's state.
    pub fn get(&self, probe_id: &str) -> Option<&RunState> {
        self.entries.iter().find(|e| e.probe.id == probe_id)
    }

    /// Aggregate summary of this snapshot.
    pub fn summary(&self) -> Summary {
        summarize(&self.entries)
    }
}

#[derive(Debug, Default)]
struct Inner {
    order: Vec<String>,
    states: HashMap<String, RunState>,
    /// Running probes no longer in the catalog, keyed by id.
    detached: HashMap<String, RunState>,
    revision: u64,
}

impl Inner {
    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            revision: self.revision,
            entries: self
                .order
                .iter()
                .filter_map(|id| self.states.get(id).cloned())
                .collect(),
        }
    }

    fn state_mut(&mut self, probe_id: &str) -> Result<&mut RunState> {
        self.states
            .get_mut(probe_id)
            .ok_or_else(|| TestbenchError::UnknownProbe(probe_id.to_string()))
    }
}

/// Process-local store holding exactly one [`RunState`] per registered probe.
#[derive(Debug)]
pub struct RunStateStore {
    inner: Mutex<Inner>,
    tx: watch::Sender<StoreSnapshot>,
}

impl Default for RunStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StoreSnapshot::default());
        Self {
            inner: Mutex::new(Inner::default()),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump the revision and publish. Called with the lock held so
    /// subscribers observe revisions in order.
    fn publish(&self, inner: &mut Inner) {
        inner.revision += 1;
        self.tx.send_replace(inner.snapshot());
    }

    /// Load a catalog, replacing the registered probe set.
    ///
    /// Probes still present keep their state, new ones start `Idle`,
    /// missing ones are dropped unless still running. Duplicate ids keep
    /// the first occurrence. Returns the deduplicated catalog.
    pub fn register(&self, probes: Vec<Probe>) -> Vec<Probe> {
        let mut seen = HashSet::new();
        let mut catalog = Vec::with_capacity(probes.len());
        for probe in probes {
            if seen.insert(probe.id.clone()) {
                catalog.push(probe);
            } else {
                warn!(probe_id = %probe.id, "duplicate probe id in catalog, ignoring");
            }
        }

        let mut inner = self.lock();
        let mut previous = std::mem::take(&mut inner.states);
        for (id, state) in std::mem::take(&mut inner.detached) {
            previous.entry(id).or_insert(state);
        }
        inner.order = catalog.iter().map(|p| p.id.clone()).collect();
        for probe in &catalog {
            let state = match previous.remove(&probe.id) {
                Some(mut existing) => {
                    existing.probe = probe.clone();
                    existing
                }
                None => RunState::idle(probe.clone()),
            };
            inner.states.insert(probe.id.clone(), state);
        }
        let (detached, removed): (HashMap<_, _>, HashMap<_, _>) = previous
            .into_iter()
            .partition(|(_, state)| state.phase.is_running());
        if !removed.is_empty() {
            debug!(removed = removed.len(), "dropped probes no longer in catalog");
        }
        if !detached.is_empty() {
            warn!(
                in_flight = detached.len(),
                "running probes removed from catalog, holding until they settle"
            );
        }
        inner.detached = detached;
        self.publish(&mut inner);
        catalog
    }

    /// Transition a probe to `Running`.
    ///
    /// Fails with [`TestbenchError::AlreadyRunning`] if it is already running.
    pub fn begin_run(&self, probe_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let state = inner.state_mut(probe_id)?;
        let previous = match std::mem::replace(&mut state.phase, RunPhase::Idle) {
            running @ RunPhase::Running { .. } => {
                state.phase = running;
                return Err(TestbenchError::AlreadyRunning {
                    probe_id: probe_id.to_string(),
                });
            }
            RunPhase::Idle => None,
            RunPhase::Completed(result) => Some(result),
        };
        state.phase = RunPhase::Running {
            started_at: Utc::now(),
            previous,
        };
        state.runs += 1;
        self.publish(&mut inner);
        Ok(())
    }

    /// Transition a probe to `Completed(result)`, superseding any earlier result.
    ///
    /// A probe that left the catalog mid-run is released instead; its
    /// result is not retained.
    pub fn record_result(&self, probe_id: &str, result: ProbeResult) -> Result<()> {
        let mut inner = self.lock();
        if inner.detached.remove(probe_id).is_some() {
            debug!(probe_id = %probe_id, "probe left the catalog mid-run, result not retained");
            return Ok(());
        }
        let state = inner.state_mut(probe_id)?;
        state.phase = RunPhase::Completed(result);
        self.publish(&mut inner);
        Ok(())
    }

    /// Current state of one probe.
    pub fn get(&self, probe_id: &str) -> Option<RunState> {
        self.lock().states.get(probe_id).cloned()
    }

    /// Current state of every probe, in catalog order.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot()
    }

    /// Summary of the current state.
    pub fn summary(&self) -> Summary {
        self.snapshot().summary()
    }

    /// Registered probes, in catalog order.
    pub fn probes(&self) -> Vec<Probe> {
        self.snapshot().entries.into_iter().map(|e| e.probe).collect()
    }

    /// Whether `probe_id` is registered.
    pub fn contains(&self, probe_id: &str) -> bool {
        self.lock().states.contains_key(probe_id)
    }

    /// Number of registered probes.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to state changes. The receiver always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.tx.subscribe()
    }
}
