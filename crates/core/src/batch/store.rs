use chrono::{DateTime, Utc};

use super::{Batch, BatchFilter, QcJob, QcJobResult, SubmitBatchRequest};
use crate::lifecycle::{LifecycleStore, StoreError};

/// Persistence for batches and their QC jobs.
pub trait BatchStore: LifecycleStore<Batch> {
    /// Record a new batch in `Staged`. Fails with `AlreadyExists` on id reuse.
    fn create(
        &self,
        request: &SubmitBatchRequest,
        ingestion_path: &str,
        submitter_privileged: bool,
    ) -> Result<Batch, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Batch>, StoreError>;

    fn list(&self, filter: &BatchFilter) -> Result<Vec<Batch>, StoreError>;

    fn count(&self, filter: &BatchFilter) -> Result<i64, StoreError>;

    /// Number of batches per state type.
    fn count_by_state(&self) -> Result<Vec<(String, i64)>, StoreError>;

    /// Stamp `cleaned_up_at` once; later calls keep the first stamp.
    fn mark_cleaned_up(&self, id: &str, at: DateTime<Utc>) -> Result<Batch, StoreError>;

    /// Reserve the single pending QC slot for a batch.
    ///
    /// Returns `Conflict` if a pending job already exists.
    fn claim_qc_job(&self, batch_id: &str) -> Result<QcJob, StoreError>;

    /// Record the backend's id for a claimed job.
    fn attach_backend_job(&self, job_id: &str, backend_job_id: &str) -> Result<QcJob, StoreError>;

    fn pending_qc_job(&self, batch_id: &str) -> Result<Option<QcJob>, StoreError>;

    fn get_qc_job(&self, job_id: &str) -> Result<Option<QcJob>, StoreError>;

    /// Settle a pending job. A job that is already settled is returned unchanged.
    fn finish_qc_job(
        &self,
        job_id: &str,
        result: QcJobResult,
        artifact_path: Option<&str>,
        reason: Option<&str>,
    ) -> Result<QcJob, StoreError>;

    fn mark_qc_polled(&self, job_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    fn list_qc_jobs(&self, batch_id: &str) -> Result<Vec<QcJob>, StoreError>;
}
