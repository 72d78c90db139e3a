//! Task runner API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use archivist_core::OrchestratorStatus;

use crate::state::AppState;

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Runner state, queue depth and entity counts by state
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    Json(state.runner().status().await)
}

/// Start the task runner
pub async fn start(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.runner().start().await;
    Json(MessageResponse {
        message: "Task runner started".to_string(),
    })
}

/// Stop the task runner. In-flight tasks finish first.
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.runner().stop().await;
    Json(MessageResponse {
        message: "Task runner stopped".to_string(),
    })
}
