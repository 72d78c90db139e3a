use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Lifecycle;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Compare-and-swap lost: the stored state was not the expected one.
    #[error("state conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub(crate) fn db(e: impl std::fmt::Display) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// One applied transition, kept for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from_state: String,
    pub to_state: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Persistence for lifecycle entities.
pub trait LifecycleStore<E: Lifecycle>: Send + Sync {
    fn load(&self, id: &str) -> Result<E, StoreError>;

    /// Replace the state iff the stored state type equals `expected`.
    ///
    /// The history row is written in the same transaction.
    fn compare_and_swap(
        &self,
        id: &str,
        expected: &str,
        next: &E::State,
    ) -> Result<E, StoreError>;

    /// Set the cancellation flag. Returns the entity as stored afterwards.
    fn request_cancel(&self, id: &str) -> Result<E, StoreError>;

    /// Transitions in the order they were applied.
    fn history(&self, id: &str) -> Result<Vec<TransitionRecord>, StoreError>;
}
