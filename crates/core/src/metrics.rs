//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Runs (started, finished by result)
//! - Stages (duration, retry attempts)
//! - Dead-letter queue (entries created, replays by result)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Run Metrics
// =============================================================================

/// Runs started total.
pub static RUNS_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("aurora_runs_started_total", "Total pipeline runs started"),
        &["trigger"], // "scheduled", "manual", "api"
    )
    .unwrap()
});

/// Runs finished total by result.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("aurora_runs_finished_total", "Total pipeline runs finished"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

/// Triggers rejected because a run was already active.
pub static RUNS_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "aurora_runs_rejected_total",
        "Triggers rejected because another run was active",
    )
    .unwrap()
});

// =============================================================================
// Stage Metrics
// =============================================================================

/// Stage duration in seconds, retries and backoff included.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("aurora_stage_duration_seconds", "Duration of pipeline stages")
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 600.0]),
        &["stage", "result"],
    )
    .unwrap()
});

/// Retry attempts by stage and error kind.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("aurora_retry_attempts_total", "Failed attempts that were retried"),
        &["stage", "kind"], // kind: "rate_limited", "error"
    )
    .unwrap()
});

/// Placeholder artifacts produced in place of a real provider.
pub static PLACEHOLDERS_USED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "aurora_placeholders_used_total",
            "Artifacts produced by placeholder implementations",
        ),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// DLQ Metrics
// =============================================================================

/// DLQ entries created by operation.
pub static DLQ_ENTRIES_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("aurora_dlq_entries_created_total", "Total DLQ entries created"),
        &["operation"],
    )
    .unwrap()
});

/// DLQ replays by result.
pub static DLQ_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("aurora_dlq_processed_total", "Total DLQ replays"),
        &["operation", "result"], // result: "resolved", "requeued", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Runs
        Box::new(RUNS_STARTED.clone()),
        Box::new(RUNS_FINISHED.clone()),
        Box::new(RUNS_REJECTED.clone()),
        // Stages
        Box::new(STAGE_DURATION.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(PLACEHOLDERS_USED.clone()),
        // DLQ
        Box::new(DLQ_ENTRIES_CREATED.clone()),
        Box::new(DLQ_PROCESSED.clone()),
    ]
}
