use async_trait::async_trait;

use super::{QcError, QcPoll};

/// Submits batches to the QC stage and reports their verdicts.
///
/// Both calls return promptly; QC runs asynchronously on the backend.
#[async_trait]
pub trait QcExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Start a QC run over `input_path`. Returns the backend job id.
    async fn submit(&self, batch_id: &str, input_path: &str) -> Result<String, QcError>;

    async fn poll_result(&self, job_id: &str) -> Result<QcPoll, QcError>;
}
