//! Order API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use archivist_core::{EntityStatus, Order, OrderFilter};

use super::batches::CancelBody;
use super::handlers::{api_error, orchestrator_error, store_error, ApiError};
use super::middleware::Operator;
use crate::state::AppState;

/// Maximum allowed limit for order queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for order queries
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub state: Option<String>,
    pub requested_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<Order>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = OrderFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref state_filter) = params.state {
        filter = filter.with_state(state_filter);
    }
    if let Some(ref requested_by) = params.requested_by {
        filter = filter.with_requested_by(requested_by);
    }

    let (orders, total) = state.status().list_orders(&filter).map_err(store_error)?;

    Ok(Json(ListOrdersResponse {
        orders,
        total,
        limit,
        offset,
    }))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EntityStatus>, ApiError> {
    match state.status().order_status(&id) {
        Ok(Some(status)) => Ok(Json(status)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Order not found: {}", id),
        )),
        Err(e) => Err(store_error(e)),
    }
}

/// Cancel an order (DELETE endpoint)
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Operator(operator): Operator,
    body: Option<Json<CancelBody>>,
) -> Result<Json<Order>, ApiError> {
    let reason = body.and_then(|b| b.reason.clone());
    state
        .orders()
        .cancel_order(&id, &operator, reason)
        .await
        .map(Json)
        .map_err(orchestrator_error)
}

/// The consumer finished downloading. Past-due tickets expire instead.
pub async fn confirm_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    state
        .orders()
        .confirm_fulfilled(&id, Utc::now())
        .await
        .map(Json)
        .map_err(orchestrator_error)
}
