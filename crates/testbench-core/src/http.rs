//! HTTP adapters for the platform API.
//!
//! Provides the shared `reqwest` client construction and the
//! [`HttpProbeExecutor`], which calls `POST {api_url}/testbench/run/{id}`.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::client::{ExecutorError, ProbeExecutor};
use crate::config::TestbenchConfig;
use crate::error::{Result, TestbenchError};

/// Longest response body excerpt kept in an error.
const MAX_ERROR_BODY: usize = 512;

/// Build the HTTP client used by every adapter.
///
/// No request timeout is set here; probe deadlines are enforced by
/// [`ProbeClient`](crate::client::ProbeClient).
pub(crate) fn build_http_client(config: &TestbenchConfig) -> Result<reqwest::Client> {
    config.validate()?;
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| TestbenchError::Config(format!("failed to create HTTP client: {}", e)))
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Probe executor backed by the probe execution service.
#[derive(Debug, Clone)]
pub struct HttpProbeExecutor {
    run_base: Url,
    http_client: reqwest::Client,
}

impl HttpProbeExecutor {
    /// Create a new executor
    pub fn new(config: &TestbenchConfig) -> Result<Self> {
        let http_client = build_http_client(config)?;
        let run_base = Url::parse(&config.endpoint("testbench/run"))
            .map_err(|e| TestbenchError::Config(format!("invalid api_url: {}", e)))?;
        if run_base.cannot_be_a_base() {
            return Err(TestbenchError::Config(format!(
                "api_url cannot take path segments: {}",
                run_base
            )));
        }
        Ok(HttpProbeExecutor {
            run_base,
            http_client,
        })
    }

    /// URL that runs `probe_id`. The id is always a single encoded path segment.
    pub fn run_url(&self, probe_id: &str) -> Url {
        let mut url = self.run_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(probe_id);
        }
        url
    }
}

#[async_trait]
impl ProbeExecutor for HttpProbeExecutor {
    async fn execute(&self, probe_id: &str) -> std::result::Result<Value, ExecutorError> {
        let url = self.run_url(probe_id);
        debug!(probe_id = %probe_id, url = %url, "dispatching probe");

        let response = self
            .http_client
            .post(url)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ExecutorError::Decode(e.to_string()))
    }
}
