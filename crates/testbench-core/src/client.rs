//! Single-probe execution and result normalization.
//!
//! [`ProbeClient::execute`] never returns an error. Timeouts, transport
//! failures and malformed responses all come back as a failed
//! [`ProbeResult`] with the detail in `summary` and `evidence`, so one
//! unreachable backend cannot take the orchestrator down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::TestbenchConfig;
use crate::error::Result;
use crate::http::HttpProbeExecutor;
use crate::metrics::METRICS;
use crate::probe::ProbeResult;

/// Failure reported by a [`ProbeExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("probe service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode probe response: {0}")]
    Decode(String),
}

impl ExecutorError {
    /// Stable tag recorded in the failed result's evidence.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::Transport(_) => "transport",
            ExecutorError::Status { .. } => "status",
            ExecutorError::Decode(_) => "decode",
        }
    }
}

/// Boundary to the probe execution service.
///
/// Implementations run the named probe and hand back the raw response
/// body; normalization is the client's job.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// Execute one probe and return its raw JSON response.
    async fn execute(&self, probe_id: &str) -> std::result::Result<Value, ExecutorError>;
}

/// Wire shape of a probe response. Both snake_case and camelCase keys are accepted.
#[derive(Debug, Deserialize)]
struct ProbeResponse {
    passed: bool,
    summary: String,
    #[serde(default, alias = "latencyMs")]
    latency_ms: Option<f64>,
    #[serde(default)]
    evidence: Value,
    #[serde(default, alias = "traceId")]
    trace_id: Option<String>,
    #[serde(default)]
    warning: Option<String>,
}

/// Map a raw response onto a [`ProbeResult`].
///
/// `measured_ms` stands in when the service did not report a usable latency.
pub fn normalize(
    probe_id: &str,
    raw: Value,
    measured_ms: u64,
) -> std::result::Result<ProbeResult, String> {
    let response: ProbeResponse = serde_json::from_value(raw).map_err(|e| e.to_string())?;

    let latency_ms = match response.latency_ms {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms.round() as u64,
        _ => measured_ms,
    };
    let warning = response.warning.filter(|w| !w.trim().is_empty());
    let trace_id = response.trace_id.filter(|t| !t.is_empty());

    let mut result = ProbeResult::new(
        probe_id,
        response.passed,
        response.summary,
        latency_ms,
        response.evidence,
    );
    result.trace_id = trace_id;
    result.warning = warning;
    Ok(result)
}

/// Timeout-bounded probe client.
#[derive(Clone)]
pub struct ProbeClient {
    executor: Arc<dyn ProbeExecutor>,
    timeout: Duration,
}

impl std::fmt::Debug for ProbeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProbeClient {
    /// Wrap an executor with an execution timeout.
    pub fn new(executor: Arc<dyn ProbeExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    /// Client backed by the HTTP probe execution service.
    pub fn from_config(config: &TestbenchConfig) -> Result<Self> {
        let executor = HttpProbeExecutor::new(config)?;
        Ok(Self::new(Arc::new(executor), config.probe_timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one probe. Every failure mode is folded into the result.
    pub async fn execute(&self, probe_id: &str) -> ProbeResult {
        METRICS.inc_probes_executed();
        let start = tokio::time::Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.executor.execute(probe_id)).await;
        let measured_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(probe_id = %probe_id, timeout_ms, "probe timed out");
                METRICS.inc_probe_timeouts();
                ProbeResult::timed_out(probe_id, timeout_ms)
            }
            Ok(Err(e)) => {
                warn!(probe_id = %probe_id, error = %e, "probe execution failed");
                METRICS.inc_probe_failures();
                ProbeResult::failed(
                    probe_id,
                    format!("probe execution failed: {}", e),
                    measured_ms,
                    json!({ "error": e.kind(), "detail": e.to_string() }),
                )
            }
            Ok(Ok(raw)) => {
                let original = raw.clone();
                match normalize(probe_id, raw, measured_ms) {
                    Ok(result) => {
                        debug!(probe_id = %probe_id, passed = result.passed, "probe responded");
                        result
                    }
                    Err(detail) => {
                        warn!(probe_id = %probe_id, error = %detail, "malformed probe response");
                        METRICS.inc_probe_failures();
                        ProbeResult::failed(
                            probe_id,
                            format!("malformed probe response: {}", detail),
                            measured_ms,
                            json!({
                                "error": "malformed_response",
                                "detail": detail,
                                "raw": original,
                            }),
                        )
                    }
                }
            }
        }
    }
}
