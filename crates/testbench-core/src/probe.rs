//! Probe definitions and execution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A named, independently executable infrastructure check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Probe {
    /// Stable unique identifier (e.g. "postgres", "qdrant").
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// What the probe verifies.
    #[serde(default)]
    pub description: String,
}

impl Probe {
    /// Create a probe definition.
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    /// Display name, falling back to the id when the catalog left it blank.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Outcome of one probe execution.
///
/// A result carrying a `warning` is never a clean pass, even with
/// `passed == true`; see [`classify`](crate::aggregator::classify).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Probe this result belongs to.
    pub probe_id: String,

    /// Whether the check passed.
    pub passed: bool,

    /// Execution latency in milliseconds.
    pub latency_ms: u64,

    /// Human-readable outcome.
    pub summary: String,

    /// Opaque evidence payload returned by the probe.
    pub evidence: Value,

    /// Trace correlation id, when the probe emitted a trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// Degraded-but-non-fatal outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// When the result was produced.
    pub finished_at: DateTime<Utc>,
}

impl ProbeResult {
    /// Build a result stamped with the current time.
    pub fn new(
        probe_id: impl Into<String>,
        passed: bool,
        summary: impl Into<String>,
        latency_ms: u64,
        evidence: Value,
    ) -> Self {
        Self {
            probe_id: probe_id.into(),
            passed,
            latency_ms,
            summary: summary.into(),
            evidence,
            trace_id: None,
            warning: None,
            finished_at: Utc::now(),
        }
    }

    /// Build a failed result with the given summary and evidence.
    pub fn failed(
        probe_id: impl Into<String>,
        summary: impl Into<String>,
        latency_ms: u64,
        evidence: Value,
    ) -> Self {
        Self::new(probe_id, false, summary, latency_ms, evidence)
    }

    /// Synthetic result for an execution that exceeded its deadline.
    pub fn timed_out(probe_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::failed(
            probe_id,
            format!("probe timed out after {}ms", timeout_ms),
            timeout_ms,
            json!({ "timeout": true, "timeout_ms": timeout_ms }),
        )
    }

    /// Synthetic result for a run abandoned before the probe answered.
    pub fn cancelled(probe_id: impl Into<String>) -> Self {
        Self::failed(
            probe_id,
            "probe run cancelled before completion",
            0,
            json!({ "cancelled": true }),
        )
    }

    /// Whether a warning was attached.
    pub fn has_warning(&self) -> bool {
        self.warning.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_id() {
        let probe = Probe::new("minio", "", "object storage");
        assert_eq!(probe.display_name(), "minio");

        let probe = Probe::new("minio", "MinIO", "object storage");
        assert_eq!(probe.display_name(), "MinIO");
    }

    #[test]
    fn test_probe_deserialize_defaults() {
        let probe: Probe = serde_json::from_value(json!({ "id": "keycloak" })).unwrap();
        assert_eq!(probe.id, "keycloak");
        assert!(probe.name.is_empty());
        assert!(probe.description.is_empty());
    }

    #[test]
    fn test_timed_out_result() {
        let result = ProbeResult::timed_out("temporal", 30_000);
        assert!(!result.passed);
        assert_eq!(result.evidence["timeout"], json!(true));
        assert_eq!(result.latency_ms, 30_000);
        assert!(result.summary.contains("timed out"));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let mut result = ProbeResult::failed("qdrant", "0 points", 8, json!({}));
        result.trace_id = Some("abc".to_string());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["probeId"], json!("qdrant"));
        assert_eq!(value["latencyMs"], json!(8));
        assert_eq!(value["traceId"], json!("abc"));
        assert!(value.get("warning").is_none());
    }
}
