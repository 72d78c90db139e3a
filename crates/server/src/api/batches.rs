//! Batch API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use archivist_core::{Batch, BatchFilter, EntityStatus};

use super::handlers::{api_error, orchestrator_error, store_error, ApiError};
use super::middleware::Operator;
use crate::state::AppState;

/// Maximum allowed limit for batch queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for batch queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for listing batches
#[derive(Debug, Deserialize)]
pub struct ListBatchesParams {
    /// Filter by state type
    pub state: Option<String>,
    /// Filter by submitter
    pub submitted_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub batches: Vec<Batch>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Request body for cancelling a batch or order
#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub reason: Option<String>,
}

/// List batches with optional filters
pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListBatchesParams>,
) -> Result<Json<ListBatchesResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = BatchFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref state_filter) = params.state {
        filter = filter.with_state(state_filter);
    }
    if let Some(ref submitted_by) = params.submitted_by {
        filter = filter.with_submitted_by(submitted_by);
    }

    let (batches, total) = state.status().list_batches(&filter).map_err(store_error)?;

    Ok(Json(ListBatchesResponse {
        batches,
        total,
        limit,
        offset,
    }))
}

/// Current state, transition history and QC jobs of one batch
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EntityStatus>, ApiError> {
    match state.status().batch_status(&id) {
        Ok(Some(status)) => Ok(Json(status)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Batch not found: {}", id),
        )),
        Err(e) => Err(store_error(e)),
    }
}

/// Cancel a batch (DELETE endpoint)
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Operator(operator): Operator,
    body: Option<Json<CancelBody>>,
) -> Result<Json<Batch>, ApiError> {
    let reason = body.and_then(|b| b.reason.clone());
    state
        .batches()
        .cancel_batch(&id, &operator, reason)
        .await
        .map(Json)
        .map_err(orchestrator_error)
}

/// Remove the ingestion data of a rejected, failed or cancelled batch
pub async fn delete_batch_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Operator(operator): Operator,
) -> Result<Json<Batch>, ApiError> {
    state
        .batches()
        .delete_batch_data(&id, &operator)
        .await
        .map(Json)
        .map_err(orchestrator_error)
}
