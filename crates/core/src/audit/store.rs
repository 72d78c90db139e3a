use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{AuditRecord, AuditSubject};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

const DEFAULT_PAGE: i64 = 100;

/// Audit query. Unset fields match everything; results are newest first.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub entity_type: Option<AuditSubject>,
    pub entity_id: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            entity_type: None,
            entity_id: None,
            event_type: None,
            user_id: None,
            from: None,
            to: None,
            limit: DEFAULT_PAGE,
            offset: 0,
        }
    }
}

impl AuditFilter {
    /// Everything recorded about one batch or order.
    pub fn trail(subject: AuditSubject, id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(subject),
            entity_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn page(self, limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset,
            ..self
        }
    }
}

pub trait AuditStore: Send + Sync {
    /// Append records in one transaction; returns how many were written.
    fn append(&self, records: &[AuditRecord]) -> Result<usize, AuditError>;

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Matching records, ignoring `limit` and `offset`.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
