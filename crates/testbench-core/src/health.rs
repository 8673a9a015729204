//! Read-only client for the health/evidence aggregation endpoint.
//!
//! The endpoint returns nested counters per backing store, e.g.
//! `{ "qdrant": { "points": 42 }, "postgres": { "invoices": 7 } }`.
//! Nothing here feeds the orchestrator; it is dashboard telemetry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TestbenchConfig;
use crate::error::{Result, TestbenchError};
use crate::http::build_http_client;

/// Point-in-time evidence document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthReport {
    pub stores: BTreeMap<String, Value>,
}

impl HealthReport {
    /// Flatten numeric leaves to `("store.counter", value)` pairs, sorted by path.
    ///
    /// Arrays and strings are sample evidence, not counters, and are skipped.
    pub fn counters(&self) -> Vec<(String, f64)> {
        let mut out = Vec::new();
        for (store, value) in &self.stores {
            collect_counters(store, value, &mut out);
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Names of the reporting stores.
    pub fn store_names(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }
}

fn collect_counters(path: &str, value: &Value, out: &mut Vec<(String, f64)>) {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                out.push((path.to_string(), v));
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                collect_counters(&format!("{}.{}", path, key), child, out);
            }
        }
        _ => {}
    }
}

/// Client for `GET {api_url}/health/evidence`.
#[derive(Debug, Clone)]
pub struct HealthClient {
    url: String,
    http_client: reqwest::Client,
}

impl HealthClient {
    pub fn new(config: &TestbenchConfig) -> Result<Self> {
        Ok(Self {
            url: config.endpoint("health/evidence"),
            http_client: build_http_client(config)?,
        })
    }

    /// Fetch the current evidence document.
    pub async fn fetch(&self) -> Result<HealthReport> {
        let response = self.http_client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TestbenchError::Http(format!(
                "{} returned status {}",
                self.url, status
            )));
        }
        Ok(response.json::<HealthReport>().await?)
    }
}
