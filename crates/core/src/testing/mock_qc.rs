//! Mock QC executor for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::qc::{QcError, QcExecutor, QcPoll};

/// A recorded submission.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub batch_id: String,
    pub input_path: String,
    pub job_id: String,
}

/// Scripted QC backend.
///
/// Poll results are scripted per batch; the last scripted result repeats.
/// Unscripted batches stay pending.
///
/// # Example
///
/// ```rust,ignore
/// let qc = MockQcExecutor::new();
/// qc.script("b-1", vec![QcPoll::pending(), QcPoll::pass("reports/b-1.json")]).await;
/// ```
#[derive(Debug, Default)]
pub struct MockQcExecutor {
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    jobs: Arc<RwLock<HashMap<String, String>>>,
    scripts: Arc<RwLock<HashMap<String, VecDeque<QcPoll>>>>,
    polls: Arc<RwLock<Vec<String>>>,
    submit_error: Arc<RwLock<Option<QcError>>>,
    poll_error: Arc<RwLock<Option<QcError>>>,
}

impl MockQcExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script(&self, batch_id: &str, results: Vec<QcPoll>) {
        self.scripts
            .write()
            .await
            .insert(batch_id.to_string(), results.into());
    }

    /// Every submission fails with `error` until cleared.
    pub async fn fail_submissions(&self, error: QcError) {
        *self.submit_error.write().await = Some(error);
    }

    pub async fn fail_polls(&self, error: QcError) {
        *self.poll_error.write().await = Some(error);
    }

    pub async fn clear_failures(&self) {
        *self.submit_error.write().await = None;
        *self.poll_error.write().await = None;
    }

    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    /// Backend job ids polled, in order.
    pub async fn polls(&self) -> Vec<String> {
        self.polls.read().await.clone()
    }
}

#[async_trait]
impl QcExecutor for MockQcExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, batch_id: &str, input_path: &str) -> Result<String, QcError> {
        if let Some(ref e) = *self.submit_error.read().await {
            return Err(e.clone());
        }

        let mut submissions = self.submissions.write().await;
        let job_id = format!("mock-job-{}", submissions.len() + 1);
        submissions.push(RecordedSubmission {
            batch_id: batch_id.to_string(),
            input_path: input_path.to_string(),
            job_id: job_id.clone(),
        });
        self.jobs
            .write()
            .await
            .insert(job_id.clone(), batch_id.to_string());
        Ok(job_id)
    }

    async fn poll_result(&self, job_id: &str) -> Result<QcPoll, QcError> {
        self.polls.write().await.push(job_id.to_string());
        if let Some(ref e) = *self.poll_error.read().await {
            return Err(e.clone());
        }

        let batch_id = self
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| QcError::Rejected(format!("unknown job {}", job_id)))?;

        let mut scripts = self.scripts.write().await;
        let poll = match scripts.get_mut(&batch_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(poll.unwrap_or_else(QcPoll::pending))
    }
}
