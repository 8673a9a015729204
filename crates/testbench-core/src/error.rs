//! Orchestrator-level error taxonomy.
//!
//! Probe failures are not errors here: the client folds them into a failed
//! [`ProbeResult`](crate::probe::ProbeResult). These variants only cover
//! conditions that block a run action entirely.

/// Testbench orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum TestbenchError {
    #[error("probe registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("probe {probe_id} is already running")]
    AlreadyRunning { probe_id: String },

    #[error("a run-all is already in progress")]
    RunInProgress,

    #[error("unknown probe: {0}")]
    UnknownProbe(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TestbenchError {
    fn from(err: reqwest::Error) -> Self {
        TestbenchError::Http(err.to_string())
    }
}

/// Result type for testbench operations.
pub type Result<T> = std::result::Result<T, TestbenchError>;
