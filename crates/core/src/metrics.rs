//! Prometheus metrics for core components.
//!
//! Covers lifecycle transitions, QC backend traffic, the task queue and
//! order staging. The server registers everything in [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Batch transitions by target state.
pub static BATCH_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "archivist_batch_transitions_total",
            "Total batch state transitions",
        ),
        &["to_state"],
    )
    .unwrap()
});

/// Order transitions by target state.
pub static ORDER_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "archivist_order_transitions_total",
            "Total order state transitions",
        ),
        &["to_state"],
    )
    .unwrap()
});

/// Batches that skipped QC through auto-approval.
pub static BATCHES_AUTO_APPROVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "archivist_batches_auto_approved_total",
        "Batches approved without running QC",
    )
    .unwrap()
});

// =============================================================================
// QC Backend Metrics
// =============================================================================

/// QC submissions by result.
pub static QC_SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_qc_submissions_total", "Total QC job submissions"),
        &["result"], // "submitted", "adopted", "rejected", "error"
    )
    .unwrap()
});

/// QC polls by observed outcome.
pub static QC_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_qc_polls_total", "Total QC result polls"),
        &["outcome"], // "pending", "pass", "fail", "error", "throttled"
    )
    .unwrap()
});

/// QC jobs that exceeded the configured runtime.
pub static QC_TIMEOUTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("archivist_qc_timeouts_total", "QC jobs that timed out").unwrap()
});

// =============================================================================
// Task Queue Metrics
// =============================================================================

/// Task executions by kind and outcome.
pub static TASKS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("archivist_tasks_processed_total", "Total task executions"),
        &["kind", "outcome"], // outcome: "done", "rescheduled", "retried", "failed"
    )
    .unwrap()
});

/// Task execution duration in seconds.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "archivist_task_duration_seconds",
            "Duration of a single task execution",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["kind"],
    )
    .unwrap()
});

/// State-transition races lost to another worker.
pub static TRANSITION_CONFLICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "archivist_transition_conflicts_total",
            "Compare-and-swap conflicts on entity state",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Delivery Metrics
// =============================================================================

/// Files copied into order staging areas.
pub static ITEMS_STAGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "archivist_items_staged_total",
        "Production items copied into order staging",
    )
    .unwrap()
});

/// Download tickets issued.
pub static TICKETS_ISSUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("archivist_tickets_issued_total", "Download tickets issued").unwrap()
});

/// Staging areas removed by the cleanup sweep.
pub static STAGING_CLEANUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "archivist_staging_cleanups_total",
            "Order staging areas removed",
        ),
        &["result"], // "removed", "error"
    )
    .unwrap()
});

/// Manifest checks run before QC.
pub static INTEGRITY_CHECKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "archivist_integrity_checks_total",
            "Batch manifest checks against ingestion data",
        ),
        &["result"], // "verified", "mismatch"
    )
    .unwrap()
});

/// Ingestion collections removed after an unsuccessful batch.
pub static INGESTION_CLEANUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "archivist_ingestion_cleanups_total",
            "Ingestion collections removed",
        ),
        &["result"], // "removed", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lifecycle
        Box::new(BATCH_TRANSITIONS.clone()),
        Box::new(ORDER_TRANSITIONS.clone()),
        Box::new(BATCHES_AUTO_APPROVED.clone()),
        Box::new(INTEGRITY_CHECKS.clone()),
        Box::new(INGESTION_CLEANUPS.clone()),
        // QC
        Box::new(QC_SUBMISSIONS.clone()),
        Box::new(QC_POLLS.clone()),
        Box::new(QC_TIMEOUTS.clone()),
        // Tasks
        Box::new(TASKS_PROCESSED.clone()),
        Box::new(TASK_DURATION.clone()),
        Box::new(TRANSITION_CONFLICTS.clone()),
        // Delivery
        Box::new(ITEMS_STAGED.clone()),
        Box::new(TICKETS_ISSUED.clone()),
        Box::new(STAGING_CLEANUPS.clone()),
    ]
}
