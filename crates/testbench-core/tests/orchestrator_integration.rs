//! Integration tests for the orchestrator against in-memory executors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use testbench_core::fakes::ScriptedExecutor;
use testbench_core::{
    ExecutorError, Orchestrator, Probe, ProbeClient, ProbeExecutor, ProbeRegistry, RunPhase,
    RunStateStore, StaticRegistry, Summary, TestbenchError,
};

fn catalog(ids: &[&str]) -> StaticRegistry {
    StaticRegistry::new(
        ids.iter()
            .map(|id| Probe::new(*id, id.to_uppercase(), format!("{} probe", id)))
            .collect(),
    )
}

fn ok_response() -> Value {
    json!({ "passed": true, "summary": "ok", "latency_ms": 1 })
}

/// Blocks every execution until the test releases permits.
struct GatedExecutor {
    gate: Semaphore,
    executions: AtomicUsize,
}

impl GatedExecutor {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            executions: AtomicUsize::new(0),
        }
    }

    fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeExecutor for GatedExecutor {
    async fn execute(&self, _probe_id: &str) -> Result<Value, ExecutorError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        permit.forget();
        Ok(ok_response())
    }
}

/// Checks, on every call, that the previous probe in catalog order has
/// already been recorded and that nothing else is running.
struct OrderCheckingExecutor {
    store: Arc<RunStateStore>,
    order: Vec<String>,
    log: Mutex<Vec<String>>,
    violations: Mutex<Vec<String>>,
}

#[async_trait]
impl ProbeExecutor for OrderCheckingExecutor {
    async fn execute(&self, probe_id: &str) -> Result<Value, ExecutorError> {
        self.log.lock().unwrap().push(probe_id.to_string());
        let snapshot = self.store.snapshot();

        let idx = self.order.iter().position(|id| id == probe_id).unwrap();
        if idx > 0 {
            let prev = &self.order[idx - 1];
            if !matches!(snapshot.get(prev).unwrap().phase, RunPhase::Completed(_)) {
                self.violations
                    .lock()
                    .unwrap()
                    .push(format!("{} started before {} completed", probe_id, prev));
            }
        }
        for entry in &snapshot.entries {
            if entry.probe.id != probe_id && entry.phase.is_running() {
                self.violations
                    .lock()
                    .unwrap()
                    .push(format!("{} overlapped {}", probe_id, entry.probe.id));
            }
        }

        tokio::task::yield_now().await;
        Ok(ok_response())
    }
}

struct UnavailableRegistry;

#[async_trait]
impl ProbeRegistry for UnavailableRegistry {
    async fn list(&self) -> testbench_core::Result<Vec<Probe>> {
        Err(TestbenchError::RegistryUnavailable(
            "catalog service down".to_string(),
        ))
    }
}

async fn wait_until_running(orch: &Orchestrator, probe_id: &str) {
    let mut rx = orch.subscribe();
    rx.wait_for(|s| s.get(probe_id).map_or(false, |e| e.phase.is_running()))
        .await
        .expect("store dropped");
}

/// postgres passes, qdrant fails with a warning: the warning wins.
#[tokio::test]
async fn test_end_to_end_postgres_qdrant_summary() {
    let executor = ScriptedExecutor::new()
        .respond(
            "postgres",
            json!({ "passed": true, "latencyMs": 12, "summary": "ok" }),
        )
        .respond(
            "qdrant",
            json!({
                "passed": false,
                "warning": "low point count",
                "latencyMs": 8,
                "summary": "0 points",
            }),
        );
    let orch = Orchestrator::new(
        Arc::new(catalog(&["postgres", "qdrant"])),
        ProbeClient::new(Arc::new(executor), Duration::from_secs(30)),
    );

    let report = orch.run_all().await.expect("run_all failed");

    assert_eq!(report.completed, vec!["postgres", "qdrant"]);
    assert!(report.skipped.is_empty());
    let summary = report.summary;
    assert_eq!(
        (summary.passed, summary.warned, summary.failed, summary.total),
        (1, 1, 0, 2)
    );
    assert_eq!(orch.summary(), summary);
}

#[tokio::test]
async fn test_run_all_is_strictly_sequential() {
    let order = vec!["postgres", "minio", "qdrant", "temporal", "keycloak"];
    let store = Arc::new(RunStateStore::new());
    let executor = Arc::new(OrderCheckingExecutor {
        store: store.clone(),
        order: order.iter().map(|s| s.to_string()).collect(),
        log: Mutex::new(Vec::new()),
        violations: Mutex::new(Vec::new()),
    });
    let orch = Orchestrator::with_store(
        Arc::new(catalog(&order)),
        ProbeClient::new(executor.clone(), Duration::from_secs(30)),
        store,
    );

    let report = orch.run_all().await.unwrap();

    assert_eq!(*executor.log.lock().unwrap(), order);
    assert_eq!(report.completed, order);
    let violations = executor.violations.lock().unwrap();
    assert!(violations.is_empty(), "ordering violations: {:?}", violations);
}

#[tokio::test]
async fn test_concurrent_run_one_same_probe_executes_once() {
    let executor = Arc::new(GatedExecutor::new());
    let orch = Arc::new(Orchestrator::new(
        Arc::new(catalog(&["postgres"])),
        ProbeClient::new(executor.clone(), Duration::from_secs(30)),
    ));
    orch.refresh_registry().await.unwrap();

    let first = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_one("postgres").await }
    });
    wait_until_running(&orch, "postgres").await;

    let second = orch.run_one("postgres").await;
    assert!(matches!(
        second,
        Err(TestbenchError::AlreadyRunning { ref probe_id }) if probe_id == "postgres"
    ));

    executor.release(1);
    let result = first.await.unwrap().unwrap();
    assert!(result.passed);
    assert_eq!(executor.executions(), 1);
    assert_eq!(orch.store().get("postgres").unwrap().runs, 1);
}

#[tokio::test]
async fn test_distinct_probes_run_concurrently() {
    let executor = Arc::new(GatedExecutor::new());
    let orch = Arc::new(Orchestrator::new(
        Arc::new(catalog(&["postgres", "qdrant"])),
        ProbeClient::new(executor.clone(), Duration::from_secs(30)),
    ));
    orch.refresh_registry().await.unwrap();

    let a = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_one("postgres").await }
    });
    let b = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_one("qdrant").await }
    });
    wait_until_running(&orch, "postgres").await;
    wait_until_running(&orch, "qdrant").await;
    assert_eq!(orch.summary().running, 2);

    executor.release(2);
    assert!(a.await.unwrap().unwrap().passed);
    assert!(b.await.unwrap().unwrap().passed);
    assert_eq!(orch.summary().passed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_does_not_leave_probe_running() {
    let executor = ScriptedExecutor::new()
        .respond("temporal", ok_response())
        .delay("temporal", Duration::from_secs(120))
        .respond("postgres", ok_response());
    let orch = Orchestrator::new(
        Arc::new(catalog(&["temporal", "postgres"])),
        ProbeClient::new(Arc::new(executor), Duration::from_secs(30)),
    );

    let report = orch.run_all().await.unwrap();
    assert_eq!(report.completed, vec!["temporal", "postgres"]);

    let state = orch.store().get("temporal").unwrap();
    let result = state.phase.result().expect("temporal should be completed");
    assert!(!result.passed);
    assert_eq!(result.evidence["timeout"], json!(true));
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.running, 0);
}

#[tokio::test]
async fn test_registry_unavailable_runs_nothing() {
    let executor = Arc::new(ScriptedExecutor::new().respond("postgres", ok_response()));
    let orch = Orchestrator::new(
        Arc::new(UnavailableRegistry),
        ProbeClient::new(executor.clone(), Duration::from_secs(30)),
    );

    let err = orch.run_all().await.unwrap_err();
    assert!(matches!(err, TestbenchError::RegistryUnavailable(_)));
    assert!(executor.calls().is_empty());
    assert_eq!(orch.summary(), Summary::default());
    assert!(!orch.is_run_all_active());
}

#[tokio::test]
async fn test_overlapping_run_all_is_rejected() {
    let executor = Arc::new(GatedExecutor::new());
    let orch = Arc::new(Orchestrator::new(
        Arc::new(catalog(&["postgres", "qdrant"])),
        ProbeClient::new(executor.clone(), Duration::from_secs(30)),
    ));

    let pass = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_all().await }
    });
    wait_until_running(&orch, "postgres").await;

    assert!(matches!(
        orch.run_all().await,
        Err(TestbenchError::RunInProgress)
    ));

    executor.release(2);
    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.completed.len(), 2);
    assert_eq!(executor.executions(), 2);
}

#[tokio::test]
async fn test_run_all_skips_probe_already_running() {
    let gated = Arc::new(GatedExecutor::new());
    let orch = Arc::new(Orchestrator::new(
        Arc::new(catalog(&["postgres"])),
        ProbeClient::new(gated.clone(), Duration::from_secs(30)),
    ));
    orch.refresh_registry().await.unwrap();

    let single = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_one("postgres").await }
    });
    wait_until_running(&orch, "postgres").await;

    let report = orch.run_all().await.unwrap();
    assert!(report.completed.is_empty());
    assert_eq!(report.skipped, vec!["postgres"]);

    gated.release(1);
    single.await.unwrap().unwrap();
    assert_eq!(gated.executions(), 1);
}

#[tokio::test]
async fn test_catalog_reload_cannot_restart_running_probe() {
    let gated = Arc::new(GatedExecutor::new());
    let orch = Arc::new(Orchestrator::new(
        Arc::new(catalog(&["postgres"])),
        ProbeClient::new(gated.clone(), Duration::from_secs(30)),
    ));
    orch.refresh_registry().await.unwrap();

    let first = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run_one("postgres").await }
    });
    wait_until_running(&orch, "postgres").await;

    orch.store().register(vec![]);
    assert_eq!(orch.summary().total, 0);
    orch.refresh_registry().await.unwrap();
    assert!(orch.store().get("postgres").unwrap().phase.is_running());

    let second = orch.run_one("postgres").await;
    assert!(matches!(second, Err(TestbenchError::AlreadyRunning { .. })));

    gated.release(1);
    assert!(first.await.unwrap().unwrap().passed);
    assert_eq!(gated.executions(), 1);
    assert_eq!(orch.summary().passed, 1);
}

#[tokio::test]
async fn test_empty_catalog_run_all_completes() -> anyhow::Result<()> {
    let executor = Arc::new(ScriptedExecutor::new());
    let orch = Orchestrator::new(
        Arc::new(StaticRegistry::default()),
        ProbeClient::new(executor.clone(), Duration::from_secs(30)),
    );

    let report = orch.run_all().await?;
    assert!(report.completed.is_empty());
    assert_eq!(report.summary.total, 0);
    assert!(executor.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_executor_failures_are_recorded_not_raised() {
    let executor = ScriptedExecutor::new()
        .fail(
            "keycloak",
            ExecutorError::Transport("connection refused".to_string()),
        )
        .respond("mlflow", json!({ "unexpected": "shape" }))
        .respond("langfuse", ok_response());
    let orch = Orchestrator::new(
        Arc::new(catalog(&["keycloak", "mlflow", "langfuse"])),
        ProbeClient::new(Arc::new(executor), Duration::from_secs(30)),
    );

    let report = orch.run_all().await.unwrap();
    assert_eq!(report.completed.len(), 3);
    assert_eq!(report.summary.failed, 2);
    assert_eq!(report.summary.passed, 1);

    let snapshot = orch.snapshot();
    let keycloak = snapshot.get("keycloak").unwrap().phase.result().unwrap();
    assert_eq!(keycloak.evidence["error"], json!("transport"));
    let mlflow = snapshot.get("mlflow").unwrap().phase.result().unwrap();
    assert_eq!(mlflow.evidence["error"], json!("malformed_response"));
}

#[tokio::test]
async fn test_total_tracks_registry_size() {
    let executor = Arc::new(ScriptedExecutor::new().respond("postgres", ok_response()));
    let orch = Orchestrator::new(
        Arc::new(catalog(&["postgres", "qdrant", "minio"])),
        ProbeClient::new(executor, Duration::from_secs(30)),
    );
    orch.refresh_registry().await.unwrap();
    assert_eq!(orch.summary().total, 3);

    orch.run_one("postgres").await.unwrap();
    let summary = orch.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.idle, 2);
}
