use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::storage::StoredFile;

/// A batch of uploaded data moving toward the production collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub submitted_by: String,
    /// Registry lookup for `submitted_by`, taken when the batch was submitted.
    pub submitter_privileged: bool,
    /// Where the submitter uploaded on the local staging filesystem, if known.
    pub staging_path: Option<String>,
    /// Collection path the QC stage reads from.
    pub ingestion_path: String,
    /// Set once the batch is promoted.
    pub production_path: Option<String>,
    /// What the submitter says was uploaded; checked before QC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<BatchManifest>,
    pub state: BatchState,
    /// Id of the current or last QC job, if any.
    pub qc_job_id: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub qc_submitted_at: Option<DateTime<Utc>>,
    pub terminal_at: Option<DateTime<Utc>>,
    /// When the ingestion collection of an unsuccessful batch was removed.
    pub cleaned_up_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Lifecycle for Batch {
    type State = BatchState;

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> &BatchState {
        &self.state
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }
}

/// Batch lifecycle.
///
/// ```text
/// Staged -> QcSubmitted -> QcPassed -> Promoted
///    |            \-> QcFailed -> Rejected
///    |-> QcPassed (privileged submitter, no QC job)
///    |-> Rejected (ingestion path missing, integrity check, QC backend refused)
///    \-> SubmissionFailed (submit retries exhausted)
/// ```
/// Any non-terminal state may also move to `Failed` or `Cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchState {
    Staged,
    QcSubmitted {
        job_id: String,
        backend_job_id: String,
        submitted_at: DateTime<Utc>,
    },
    QcPassed {
        artifact_path: Option<String>,
        auto_approved: bool,
        passed_at: DateTime<Utc>,
    },
    QcFailed {
        artifact_path: Option<String>,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    Promoted {
        production_path: String,
        promoted_at: DateTime<Utc>,
    },
    Rejected {
        artifact_path: Option<String>,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
    SubmissionFailed {
        error: String,
        attempts: u32,
        failed_at: DateTime<Utc>,
    },
    /// Unrecoverable error outside the documented failure paths.
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
    Cancelled {
        cancelled_by: String,
        reason: Option<String>,
        cancelled_at: DateTime<Utc>,
    },
}

impl BatchState {
    /// Terminal states whose ingestion data may be removed. Promoted data
    /// has already left the ingestion collection.
    pub const CLEANABLE: [&'static str; 4] =
        ["rejected", "submission_failed", "failed", "cancelled"];

    /// Artifact produced by the QC stage, kept through rejection.
    pub fn artifact_path(&self) -> Option<&str> {
        match self {
            BatchState::QcPassed { artifact_path, .. }
            | BatchState::QcFailed { artifact_path, .. }
            | BatchState::Rejected { artifact_path, .. } => artifact_path.as_deref(),
            _ => None,
        }
    }
}

impl LifecycleState for BatchState {
    fn state_type(&self) -> &'static str {
        match self {
            BatchState::Staged => "staged",
            BatchState::QcSubmitted { .. } => "qc_submitted",
            BatchState::QcPassed { .. } => "qc_passed",
            BatchState::QcFailed { .. } => "qc_failed",
            BatchState::Promoted { .. } => "promoted",
            BatchState::Rejected { .. } => "rejected",
            BatchState::SubmissionFailed { .. } => "submission_failed",
            BatchState::Failed { .. } => "failed",
            BatchState::Cancelled { .. } => "cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Promoted { .. }
                | BatchState::Rejected { .. }
                | BatchState::SubmissionFailed { .. }
                | BatchState::Failed { .. }
                | BatchState::Cancelled { .. }
        )
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use BatchState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed { .. } | Cancelled { .. }) {
            return true;
        }
        matches!(
            (self, next),
            (Staged, QcSubmitted { .. })
                | (Staged, QcPassed { .. })
                | (Staged, Rejected { .. })
                | (Staged, SubmissionFailed { .. })
                | (QcSubmitted { .. }, QcPassed { .. })
                | (QcSubmitted { .. }, QcFailed { .. })
                | (QcPassed { .. }, Promoted { .. })
                | (QcFailed { .. }, Rejected { .. })
        )
    }

    fn failure_reason(&self) -> Option<&str> {
        match self {
            BatchState::QcFailed { reason, .. } | BatchState::Rejected { reason, .. } => {
                Some(reason)
            }
            BatchState::SubmissionFailed { error, .. } | BatchState::Failed { error, .. } => {
                Some(error)
            }
            BatchState::Cancelled { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

/// Outcome recorded for a QC job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QcJobResult {
    Pending,
    Pass,
    Fail,
    TimedOut,
    /// Released without a verdict (submit failed, stale claim, cancellation).
    Abandoned,
}

impl QcJobResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcJobResult::Pending => "pending",
            QcJobResult::Pass => "pass",
            QcJobResult::Fail => "fail",
            QcJobResult::TimedOut => "timed_out",
            QcJobResult::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QcJobResult::Pending),
            "pass" => Some(QcJobResult::Pass),
            "fail" => Some(QcJobResult::Fail),
            "timed_out" => Some(QcJobResult::TimedOut),
            "abandoned" => Some(QcJobResult::Abandoned),
            _ => None,
        }
    }
}

/// A quality-control run for one batch.
///
/// At most one job per batch is `Pending` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcJob {
    pub id: String,
    pub batch_id: String,
    /// Assigned by the QC backend once submission succeeds.
    pub backend_job_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub result: QcJobResult,
    pub artifact_path: Option<String>,
    pub reason: Option<String>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One uploaded file as declared by the submitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the batch's ingestion collection.
    pub path: String,
    pub size_bytes: u64,
    /// Hex SHA-256, compared case-insensitively.
    pub sha256: String,
}

/// The complete file list of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchManifest {
    pub files: Vec<ManifestEntry>,
}

impl BatchManifest {
    /// Compare against what storage holds. Returns the first discrepancy.
    ///
    /// Every declared file must be present with the declared size and
    /// checksum, and nothing undeclared may be present.
    pub fn verify(&self, found: &[StoredFile]) -> Result<(), String> {
        for entry in &self.files {
            let Some(file) = found.iter().find(|f| f.path == entry.path) else {
                return Err(format!("missing file {}", entry.path));
            };
            if file.size_bytes != entry.size_bytes {
                return Err(format!(
                    "size mismatch for {}: expected {} bytes, found {}",
                    entry.path, entry.size_bytes, file.size_bytes
                ));
            }
            if !file.sha256.eq_ignore_ascii_case(&entry.sha256) {
                return Err(format!("checksum mismatch for {}", entry.path));
            }
        }
        if found.len() != self.files.len() {
            return Err(format!(
                "file count mismatch: expected {}, found {}",
                self.files.len(),
                found.len()
            ));
        }
        Ok(())
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Request to record a new batch.
#[derive(Debug, Clone)]
pub struct SubmitBatchRequest {
    pub batch_id: String,
    pub submitted_by: String,
    pub staging_path: Option<String>,
    /// Without a manifest only the presence of the ingestion collection is checked.
    pub manifest: Option<BatchManifest>,
}

/// Filter for listing batches.
#[derive(Debug, Clone)]
pub struct BatchFilter {
    pub state: Option<String>,
    pub submitted_by: Option<String>,
    /// Only unsuccessful batches that ended before this instant and still
    /// hold ingestion data.
    pub cleanup_due_before: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for BatchFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchFilter {
    pub fn new() -> Self {
        Self {
            state: None,
            submitted_by: None,
            cleanup_due_before: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_submitted_by(mut self, submitted_by: impl Into<String>) -> Self {
        self.submitted_by = Some(submitted_by.into());
        self
    }

    pub fn needing_cleanup(mut self, ended_before: DateTime<Utc>) -> Self {
        self.cleanup_due_before = Some(ended_before);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
