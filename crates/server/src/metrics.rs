//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Aurora server:
//! - HTTP request metrics (latency, counts)
//! - Background loop status (scheduler, DLQ processor)
//! - Run and DLQ counts by status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use aurora_core::{DlqFilter, DlqStatus, RunFilter, RunStatus};

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
            "aurora_http_request_duration_seconds",
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
        Opts::new("aurora_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "aurora_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics (collected dynamically)
// =============================================================================

/// Runs currently executing.
pub static RUNS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("aurora_runs_active", "Number of pipeline runs in progress").unwrap()
});

/// Runs by status.
pub static RUNS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("aurora_runs_by_status", "Stored run count by status"),
        &["status"],
    )
    .unwrap()
});

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "aurora_scheduler_running",
        "Whether the scheduler is running (1) or stopped (0)",
    )
    .unwrap()
});

// =============================================================================
// DLQ Metrics (collected dynamically)
// =============================================================================

/// DLQ processor running state (1 = running, 0 = stopped).
pub static DLQ_PROCESSOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "aurora_dlq_processor_running",
        "Whether the DLQ processor is running (1) or stopped (0)",
    )
    .unwrap()
});

/// DLQ entries by status.
pub static DLQ_ENTRIES_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("aurora_dlq_entries_by_status", "Dead-letter entries by status"),
        &["status"],
    )
    .unwrap()
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

    // Pipeline
    registry.register(Box::new(RUNS_ACTIVE.clone())).unwrap();
    registry.register(Box::new(RUNS_BY_STATUS.clone())).unwrap();
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();

    // DLQ
    registry
        .register(Box::new(DLQ_PROCESSOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(DLQ_ENTRIES_BY_STATUS.clone()))
        .unwrap();

    // Core metrics (runs, stages, retries, dead letters)
    for metric in aurora_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the stores and the
/// background loops at scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let orchestrator = state.orchestrator().status();
    RUNS_ACTIVE.set(orchestrator.active_count as i64);

    SCHEDULER_RUNNING.set(if state.scheduler().is_running() { 1 } else { 0 });
    DLQ_PROCESSOR_RUNNING.set(if state.dlq_processor().is_running() { 1 } else { 0 });

    let run_store = state.run_store();
    for status in [
        RunStatus::Pending,
        RunStatus::Running,
        RunStatus::Completed,
        RunStatus::Failed,
    ] {
        let filter = RunFilter::new().with_status(status);
        if let Ok(count) = run_store.count_runs(&filter) {
            RUNS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }

    let dlq_store = state.dlq_store();
    for status in [
        DlqStatus::Pending,
        DlqStatus::Retrying,
        DlqStatus::Resolved,
        DlqStatus::Failed,
    ] {
        let filter = DlqFilter::new().with_status(status);
        if let Ok(count) = dlq_store.count(&filter) {
            DLQ_ENTRIES_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }
}

static UUID_SEGMENT: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

static NUMERIC_SEGMENT: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}
