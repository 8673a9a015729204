//! In-memory fakes for the probe execution boundary (testing only)
//!
//! [`ScriptedExecutor`] answers each probe id with a canned response or
//! error, optionally after a delay, and records every call in order.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ExecutorError, ProbeExecutor};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Probe executor driven by per-probe scripts.
///
/// Probes without a script answer with a 404 status error.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Result<Value, ExecutorError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `probe_id` with `response`.
    pub fn respond(self, probe_id: &str, response: Value) -> Self {
        self.set_response(probe_id, response);
        self
    }

    /// Answer `probe_id` with `error`.
    pub fn fail(self, probe_id: &str, error: ExecutorError) -> Self {
        lock(&self.scripts).insert(probe_id.to_string(), Err(error));
        self
    }

    /// Sleep for `delay` before answering `probe_id`.
    pub fn delay(self, probe_id: &str, delay: Duration) -> Self {
        lock(&self.delays).insert(probe_id.to_string(), delay);
        self
    }

    /// Replace the response for `probe_id` (e.g. between reruns).
    pub fn set_response(&self, probe_id: &str, response: Value) {
        lock(&self.scripts).insert(probe_id.to_string(), Ok(response));
    }

    /// Probe ids in the order they were executed.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of executions of `probe_id`.
    pub fn call_count(&self, probe_id: &str) -> usize {
        lock(&self.calls).iter().filter(|id| *id == probe_id).count()
    }
}

#[async_trait]
impl ProbeExecutor for ScriptedExecutor {
    async fn execute(&self, probe_id: &str) -> Result<Value, ExecutorError> {
        lock(&self.calls).push(probe_id.to_string());

        let delay = lock(&self.delays).get(probe_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        lock(&self.scripts)
            .get(probe_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(ExecutorError::Status {
                    status: 404,
                    body: format!("no script for probe {}", probe_id),
                })
            })
    }
}
