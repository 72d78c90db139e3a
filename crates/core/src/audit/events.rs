use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuditEventEnvelope;
use crate::queue::TaskKind;

/// Which lifecycle an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSubject {
    Batch,
    Order,
}

impl AuditSubject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Order => "order",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "batch" => Some(Self::Batch),
            "order" => Some(Self::Order),
            _ => None,
        }
    }

    fn of_task(task_kind: &str) -> Option<Self> {
        TaskKind::parse(task_kind).ok().map(|kind| {
            if kind.is_batch_task() {
                Self::Batch
            } else {
                Self::Order
            }
        })
    }
}

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },
    PrivilegedUsersSynced {
        active: usize,
        deactivated: usize,
    },

    // Batch lifecycle
    BatchSubmitted {
        batch_id: String,
        submitted_by: String,
        privileged: bool,
        ingestion_path: String,
    },
    BatchStateChanged {
        batch_id: String,
        from_state: String,
        to_state: String,
        reason: Option<String>,
    },
    QcJobSubmitted {
        batch_id: String,
        job_id: String,
        backend_job_id: String,
    },
    QcResultRecorded {
        batch_id: String,
        job_id: String,
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact_path: Option<String>,
    },
    BatchCleanedUp {
        batch_id: String,
        ingestion_path: String,
        removed_by: String,
    },

    // Order lifecycle
    OrderCreated {
        order_id: String,
        requested_by: String,
        item_count: usize,
    },
    OrderStateChanged {
        order_id: String,
        from_state: String,
        to_state: String,
        reason: Option<String>,
    },
    DownloadTicketIssued {
        order_id: String,
        staging_path: String,
        expires_at: DateTime<Utc>,
    },
    OrderCleanedUp {
        order_id: String,
        staging_path: String,
    },

    // Operator and worker events
    CancellationRequested {
        entity_type: AuditSubject,
        entity_id: String,
        requested_by: String,
        reason: Option<String>,
    },
    TaskRetryScheduled {
        task_kind: String,
        entity_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    TaskFailed {
        task_kind: String,
        entity_id: String,
        attempts: u32,
        error: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::PrivilegedUsersSynced { .. } => "privileged_users_synced",
            Self::BatchSubmitted { .. } => "batch_submitted",
            Self::BatchStateChanged { .. } => "batch_state_changed",
            Self::QcJobSubmitted { .. } => "qc_job_submitted",
            Self::QcResultRecorded { .. } => "qc_result_recorded",
            Self::BatchCleanedUp { .. } => "batch_cleaned_up",
            Self::OrderCreated { .. } => "order_created",
            Self::OrderStateChanged { .. } => "order_state_changed",
            Self::DownloadTicketIssued { .. } => "download_ticket_issued",
            Self::OrderCleanedUp { .. } => "order_cleaned_up",
            Self::CancellationRequested { .. } => "cancellation_requested",
            Self::TaskRetryScheduled { .. } => "task_retry_scheduled",
            Self::TaskFailed { .. } => "task_failed",
        }
    }

    /// Extract the batch or order id this event belongs to
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::BatchSubmitted { batch_id, .. }
            | Self::BatchStateChanged { batch_id, .. }
            | Self::QcJobSubmitted { batch_id, .. }
            | Self::QcResultRecorded { batch_id, .. }
            | Self::BatchCleanedUp { batch_id, .. } => Some(batch_id),
            Self::OrderCreated { order_id, .. }
            | Self::OrderStateChanged { order_id, .. }
            | Self::DownloadTicketIssued { order_id, .. }
            | Self::OrderCleanedUp { order_id, .. } => Some(order_id),
            Self::CancellationRequested { entity_id, .. }
            | Self::TaskRetryScheduled { entity_id, .. }
            | Self::TaskFailed { entity_id, .. } => Some(entity_id),
            _ => None,
        }
    }

    /// Batch or order, for events tied to one.
    pub fn subject(&self) -> Option<AuditSubject> {
        match self {
            Self::BatchSubmitted { .. }
            | Self::BatchStateChanged { .. }
            | Self::QcJobSubmitted { .. }
            | Self::QcResultRecorded { .. }
            | Self::BatchCleanedUp { .. } => Some(AuditSubject::Batch),
            Self::OrderCreated { .. }
            | Self::OrderStateChanged { .. }
            | Self::DownloadTicketIssued { .. }
            | Self::OrderCleanedUp { .. } => Some(AuditSubject::Order),
            Self::CancellationRequested { entity_type, .. } => Some(*entity_type),
            Self::TaskRetryScheduled { task_kind, .. } | Self::TaskFailed { task_kind, .. } => {
                AuditSubject::of_task(task_kind)
            }
            _ => None,
        }
    }

    /// Extract user_id if this event was triggered by a user action
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::BatchSubmitted { submitted_by, .. } => Some(submitted_by),
            Self::BatchCleanedUp { removed_by, .. } => Some(removed_by),
            Self::OrderCreated { requested_by, .. }
            | Self::CancellationRequested { requested_by, .. } => Some(requested_by),
            _ => None,
        }
    }
}

/// A stored audit record. The indexed columns are derived from `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Zero until stored.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: Option<AuditSubject>,
    pub entity_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}

impl From<AuditEventEnvelope> for AuditRecord {
    fn from(envelope: AuditEventEnvelope) -> Self {
        let event = envelope.event;
        Self {
            id: 0,
            timestamp: envelope.timestamp,
            event_type: event.event_type().to_string(),
            entity_type: event.subject(),
            entity_id: event.entity_id().map(String::from),
            user_id: event.user_id().map(String::from),
            data: event,
        }
    }
}
