//! Probe catalog sources.
//!
//! - `StaticRegistry`: fixed in-memory catalog
//! - `HttpRegistry`: `GET {api_url}/testbench/tools`, returning `{ "tools": [...] }`
//!
//! Order is preserved; it drives run-all sequencing.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::TestbenchConfig;
use crate::error::{Result, TestbenchError};
use crate::http::build_http_client;
use crate::probe::Probe;

/// Source of the probe catalog.
#[async_trait]
pub trait ProbeRegistry: Send + Sync {
    /// Load the ordered catalog.
    ///
    /// Fails with [`TestbenchError::RegistryUnavailable`]; callers may retry.
    async fn list(&self) -> Result<Vec<Probe>>;
}

/// Fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    probes: Vec<Probe>,
}

impl StaticRegistry {
    pub fn new(probes: Vec<Probe>) -> Self {
        Self { probes }
    }
}

#[async_trait]
impl ProbeRegistry for StaticRegistry {
    async fn list(&self) -> Result<Vec<Probe>> {
        Ok(self.probes.clone())
    }
}

/// Catalog document. A missing `tools` list means no probes.
#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    tools: Option<Vec<Probe>>,
}

/// Parse a catalog body.
pub fn parse_catalog(body: &str) -> Result<Vec<Probe>> {
    let catalog: Catalog = serde_json::from_str(body).map_err(|e| {
        TestbenchError::RegistryUnavailable(format!("invalid catalog document: {}", e))
    })?;
    Ok(catalog.tools.unwrap_or_default())
}

/// Catalog fetched from the platform API.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    url: String,
    http_client: reqwest::Client,
}

impl HttpRegistry {
    pub fn new(config: &TestbenchConfig) -> Result<Self> {
        Ok(Self {
            url: config.endpoint("testbench/tools"),
            http_client: build_http_client(config)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ProbeRegistry for HttpRegistry {
    async fn list(&self) -> Result<Vec<Probe>> {
        let unavailable = |e: reqwest::Error| TestbenchError::RegistryUnavailable(e.to_string());

        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TestbenchError::RegistryUnavailable(format!(
                "{} returned status {}",
                self.url, status
            )));
        }

        let body = response.text().await.map_err(unavailable)?;
        let probes = parse_catalog(&body)?;
        debug!(url = %self.url, count = probes.len(), "fetched probe catalog");
        Ok(probes)
    }
}
