//! Dead-letter queue API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use aurora_core::{DlqEntry, DlqFilter, DlqProcessReport, DlqStatus};

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

const MAX_LIMIT: i64 = 1000;
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for listing DLQ entries
#[derive(Debug, Deserialize)]
pub struct ListDlqParams {
    pub status: Option<String>,
    pub operation: Option<String>,
    pub run_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListDlqResponse {
    pub entries: Vec<DlqEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List DLQ entries with optional filters
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDlqParams>,
) -> Result<Json<ListDlqResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = DlqFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status) = params.status {
        let Some(status) = DlqStatus::parse(status) else {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown DLQ status: {}", status),
            ));
        };
        filter = filter.with_status(status);
    }

    // Unknown operations are still listable
    if let Some(operation) = params.operation {
        filter = filter.with_operation(operation);
    }

    if let Some(run_id) = params.run_id {
        filter = filter.with_run_id(run_id);
    }

    let entries = state
        .dlq_store()
        .list(&filter)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let total = state
        .dlq_store()
        .count(&filter)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok(Json(ListDlqResponse {
        entries,
        total,
        limit,
        offset,
    }))
}

/// Get a DLQ entry by ID
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DlqEntry>, ApiError> {
    match state.dlq_store().get(&id) {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("DLQ entry not found: {}", id),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// Run one processor pass now, regardless of the loop schedule
pub async fn process(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DlqProcessReport>, ApiError> {
    state
        .dlq_processor()
        .process_once()
        .await
        .map(Json)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e))
}
