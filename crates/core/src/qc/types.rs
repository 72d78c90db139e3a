use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Verdict reported by the QC backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QcOutcome {
    Pending,
    Pass,
    Fail,
}

/// Result of polling a QC job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcPoll {
    pub outcome: QcOutcome,
    /// Report or log produced by the run.
    pub artifact_path: Option<String>,
    /// Backend-supplied explanation, mostly for failures.
    pub message: Option<String>,
}

impl QcPoll {
    pub fn pending() -> Self {
        Self {
            outcome: QcOutcome::Pending,
            artifact_path: None,
            message: None,
        }
    }

    pub fn pass(artifact_path: impl Into<String>) -> Self {
        Self {
            outcome: QcOutcome::Pass,
            artifact_path: Some(artifact_path.into()),
            message: None,
        }
    }

    pub fn fail(artifact_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: QcOutcome::Fail,
            artifact_path: Some(artifact_path.into()),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum QcError {
    /// Transient: backend down, timeout, overload.
    #[error("qc backend unavailable: {0}")]
    Retryable(String),

    /// The backend refused the request; retrying will not help.
    #[error("qc backend rejected request: {0}")]
    Rejected(String),
}
