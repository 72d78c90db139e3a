//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the archivist server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Batch and order counts by state (collected dynamically)
//! - Task runner and queue status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "archivist_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "archivist_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Entity Metrics (collected dynamically)
// =============================================================================

pub static BATCHES_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("archivist_batches_by_state", "Current batch count by state"),
        &["state"],
    )
    .unwrap()
});

pub static ORDERS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("archivist_orders_by_state", "Current order count by state"),
        &["state"],
    )
    .unwrap()
});

// =============================================================================
// Runner Metrics (collected dynamically)
// =============================================================================

/// Task runner state (1 = running, 0 = stopped).
pub static RUNNER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "archivist_runner_running",
        "Whether the task runner is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Tasks in the queue, leased or waiting.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("archivist_queue_depth", "Tasks in the durable queue").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Entities
    registry
        .register(Box::new(BATCHES_BY_STATE.clone()))
        .unwrap();
    registry
        .register(Box::new(ORDERS_BY_STATE.clone()))
        .unwrap();

    // Runner
    registry.register(Box::new(RUNNER_RUNNING.clone())).unwrap();
    registry.register(Box::new(QUEUE_DEPTH.clone())).unwrap();

    // Core metrics (transitions, QC, tasks, staging)
    for metric in archivist_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the stores at scrape time.
pub async fn collect_dynamic_metrics(state: &AppState) {
    let status = state.runner().status().await;
    RUNNER_RUNNING.set(if status.running { 1 } else { 0 });
    QUEUE_DEPTH.set(status.pending_tasks as i64);

    for (state_type, count) in &status.batches_by_state {
        BATCHES_BY_STATE
            .with_label_values(&[state_type.as_str()])
            .set(*count);
    }
    for (state_type, count) in &status.orders_by_state {
        ORDERS_BY_STATE
            .with_label_values(&[state_type.as_str()])
            .set(*count);
    }
}
