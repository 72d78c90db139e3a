//! Types shared by the orchestrators and the task runner.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::{LifecycleError, StoreError};
use crate::qc::QcError;
use crate::queue::QueueError;
use crate::storage::StorageError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested operation does not fit the entity's current state.
    #[error("invalid state for {id}: {message}")]
    InvalidState { id: String, message: String },

    /// Caller input failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Stored data contradicts itself (e.g. state points at a missing job).
    #[error("inconsistent record {id}: {message}")]
    Inconsistent { id: String, message: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("qc error: {0}")]
    Qc(#[from] QcError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<LifecycleError> for OrchestratorError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::InvalidTransition { id, from, to } => OrchestratorError::InvalidState {
                id,
                message: format!("no transition {} -> {}", from, to),
            },
            LifecycleError::Store(e) => OrchestratorError::Store(e),
        }
    }
}

/// How the runner treats a failed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient; retry with backoff.
    Retryable,
    /// Permanent refusal from a collaborator.
    Rejected,
    /// Lost a state race; re-evaluate.
    Conflict,
    Fatal,
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Store(StoreError::Conflict { .. }) => ErrorKind::Conflict,
            OrchestratorError::Store(StoreError::Database(_)) => ErrorKind::Retryable,
            OrchestratorError::Store(_) => ErrorKind::Fatal,
            OrchestratorError::Storage(StorageError::Unavailable(_)) => ErrorKind::Retryable,
            OrchestratorError::Storage(StorageError::PathConflict { .. }) => ErrorKind::Fatal,
            OrchestratorError::Storage(StorageError::NotFound(_))
            | OrchestratorError::Storage(StorageError::AccessDenied(_)) => ErrorKind::Rejected,
            OrchestratorError::Qc(QcError::Retryable(_)) => ErrorKind::Retryable,
            OrchestratorError::Qc(QcError::Rejected(_)) => ErrorKind::Rejected,
            OrchestratorError::Queue(_) => ErrorKind::Retryable,
            OrchestratorError::InvalidRequest(_) => ErrorKind::Rejected,
            OrchestratorError::NotFound(_)
            | OrchestratorError::InvalidState { .. }
            | OrchestratorError::Inconsistent { .. } => ErrorKind::Fatal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// What a handler asks the runner to do with its delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Work finished (or was already done); ack.
    Done,
    /// Waiting on something external; run again later without counting an attempt.
    Reschedule(Duration),
    /// The external side answered but is not finished; run again later with
    /// a fresh retry budget.
    Progress(Duration),
}

/// Current status of the task runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub workers: usize,
    /// Tasks in the queue, leased or waiting.
    pub pending_tasks: u64,
    pub batches_by_state: BTreeMap<String, i64>,
    pub orders_by_state: BTreeMap<String, i64>,
}
