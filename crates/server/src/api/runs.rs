//! Run API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use aurora_core::{
    run::{Run, RunDetail},
    PipelineError, RunFilter, RunStatus, RunTrigger,
};

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for run queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for run queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing runs
#[derive(Debug, Deserialize)]
pub struct ListRunsParams {
    /// Filter by status
    pub status: Option<String>,
    /// Maximum number of runs to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing runs
#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<Run>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for a manual trigger
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub message: String,
    pub run_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List runs, newest first
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListRunsParams>,
) -> Result<Json<ListRunsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = RunFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status) = params.status {
        match RunStatus::parse(status) {
            Some(status) => filter = filter.with_status(status),
            None => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown run status: {}", status),
                ));
            }
        }
    }

    let runs = state
        .run_store()
        .list_runs(&filter)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    // count ignores pagination
    let total = state
        .run_store()
        .count_runs(&filter)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(ListRunsResponse {
        runs,
        total,
        limit,
        offset,
    }))
}

/// Get a run with its logs and assets
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunDetail>, ApiError> {
    match state.run_store().get_run_detail(&id) {
        Ok(Some(detail)) => Ok(Json(detail)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Run not found: {}", id),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// Start a run in the background and return its id
pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    match state.orchestrator().trigger(RunTrigger::Api).await {
        Ok(run_id) => {
            info!(run_id = %run_id, "Run triggered via API");
            Ok((
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    message: "Pipeline run started".to_string(),
                    run_id,
                }),
            ))
        }
        Err(e @ PipelineError::AlreadyRunning(_)) => {
            Err(error_response(StatusCode::CONFLICT, e))
        }
        Err(e @ PipelineError::Config(_)) => Err(error_response(StatusCode::BAD_REQUEST, e)),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}
