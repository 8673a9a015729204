//! Testbench configuration.
//!
//! [`TestbenchConfig::from_env`] layers environment variables over the
//! defaults; callers (the CLI) override individual fields with the
//! `with_*` builders. A malformed value is an error, never a silent default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TestbenchError};

/// Default base URL of the platform API.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Default per-probe execution timeout in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Testbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestbenchConfig {
    /// Base URL of the platform API (registry, probe runner, health evidence)
    pub api_url: String,
    /// Upper bound on a single probe execution
    pub probe_timeout: Duration,
    /// User-Agent sent on outgoing requests
    pub user_agent: String,
}

impl Default for TestbenchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

/// Parse a timeout given in whole seconds, as accepted by
/// `TESTBENCH_PROBE_TIMEOUT_SECS` and `--timeout-secs`.
pub fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| {
            TestbenchError::Config(format!(
                "probe timeout must be a whole number of seconds, got {:?}: {}",
                raw, e
            ))
        })
}

impl TestbenchConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(api_url) = std::env::var("TESTBENCH_API_URL") {
            config.api_url = api_url;
        }
        if let Ok(raw) = std::env::var("TESTBENCH_PROBE_TIMEOUT_SECS") {
            config.probe_timeout = parse_timeout_secs(&raw)?;
        }
        Ok(config)
    }

    /// Create config for a specific API base URL
    pub fn new(api_url: &str) -> Self {
        TestbenchConfig {
            api_url: api_url.to_string(),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            user_agent: format!("testbench/{}", crate::VERSION),
        }
    }

    /// Override the API base URL
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    /// Override the probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(TestbenchError::Config(format!(
                "api_url must be an http(s) URL, got {:?}",
                self.api_url
            )));
        }
        if self.probe_timeout.is_zero() {
            return Err(TestbenchError::Config(
                "probe_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Join a path onto the API base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
