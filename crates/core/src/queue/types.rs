use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown task kind: {0}")]
    UnknownKind(String),
}

impl QueueError {
    pub(crate) fn db(e: impl std::fmt::Display) -> Self {
        Self::Database(e.to_string())
    }
}

/// Unit of work handled by a worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SubmitQc,
    PollQc,
    PromoteBatch,
    StageOrder,
    IssueTicket,
    ExpireOrder,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitQc => "submit_qc",
            Self::PollQc => "poll_qc",
            Self::PromoteBatch => "promote_batch",
            Self::StageOrder => "stage_order",
            Self::IssueTicket => "issue_ticket",
            Self::ExpireOrder => "expire_order",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, QueueError> {
        match raw {
            "submit_qc" => Ok(Self::SubmitQc),
            "poll_qc" => Ok(Self::PollQc),
            "promote_batch" => Ok(Self::PromoteBatch),
            "stage_order" => Ok(Self::StageOrder),
            "issue_ticket" => Ok(Self::IssueTicket),
            "expire_order" => Ok(Self::ExpireOrder),
            other => Err(QueueError::UnknownKind(other.to_string())),
        }
    }

    /// Batch tasks operate on batches, the rest on orders.
    pub fn is_batch_task(&self) -> bool {
        matches!(self, Self::SubmitQc | Self::PollQc | Self::PromoteBatch)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    pub entity_id: String,
}

impl Task {
    pub fn new(kind: TaskKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }
}

/// A leased task. `attempts` counts failed executions so far.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: i64,
    pub task: Task,
    pub attempts: u32,
    pub lease: String,
}
