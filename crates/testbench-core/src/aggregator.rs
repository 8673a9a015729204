//! Pass/warn/fail classification and summary counts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::probe::ProbeResult;
use crate::state::{RunPhase, RunState};

/// Status class of a completed probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Pass => "pass",
            Classification::Warn => "warn",
            Classification::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Classify one result.
///
/// A warning outranks `passed`: any result carrying a warning is `Warn`,
/// whether the probe reported success or not.
pub fn classify(result: &ProbeResult) -> Classification {
    if result.has_warning() {
        Classification::Warn
    } else if result.passed {
        Classification::Pass
    } else {
        Classification::Fail
    }
}

/// Aggregate counts over the registered probes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub warned: usize,
    /// Probes currently executing (not classified).
    pub running: usize,
    /// Probes never run this session.
    pub idle: usize,
    /// Every registered probe, run or not.
    pub total: usize,
}

impl Summary {
    /// Number of probes counted in a classification.
    pub fn completed(&self) -> usize {
        self.passed + self.failed + self.warned
    }

    /// Every registered probe completed as a clean pass.
    pub fn is_healthy(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// Summarize run states. Only `Completed` entries are classified.
pub fn summarize(states: &[RunState]) -> Summary {
    let mut summary = Summary {
        total: states.len(),
        ..Summary::default()
    };

    for state in states {
        match &state.phase {
            RunPhase::Idle => summary.idle += 1,
            RunPhase::Running { .. } => summary.running += 1,
            RunPhase::Completed(result) => match classify(result) {
                Classification::Pass => summary.passed += 1,
                Classification::Warn => summary.warned += 1,
                Classification::Fail => summary.failed += 1,
            },
        }
    }

    summary
}
