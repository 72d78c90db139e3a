use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use archivist_core::{AuditFilter, AuditRecord, AuditSubject};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for audit queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for audit queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    /// `batch` or `order`
    pub entity_type: Option<AuditSubject>,
    /// Filter by batch or order ID
    pub entity_id: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    /// Events at or after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Events at or before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for audit query endpoint
#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    /// Newest first
    pub events: Vec<AuditRecord>,
    /// Total number of matching events
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl AuditQueryParams {
    /// Filter without pagination, shared by the query and the count.
    fn filter(&self) -> AuditFilter {
        AuditFilter {
            entity_type: self.entity_type,
            entity_id: self.entity_id.clone(),
            event_type: self.event_type.clone(),
            user_id: self.user_id.clone(),
            from: self.from,
            to: self.to,
            ..Default::default()
        }
    }
}

/// Query audit events
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let base_filter = params.filter();
    let query_filter = base_filter.clone().page(limit, offset);

    let events = state.audit_store().query(&query_filter).map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to query audit events: {}", e),
        )
    })?;

    let total = state.audit_store().count(&base_filter).map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to count audit events: {}", e),
        )
    })?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}
