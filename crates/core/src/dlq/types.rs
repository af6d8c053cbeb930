//! Dead-letter queue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage operation that can be dead-lettered and replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqOperation {
    TextGeneration,
    VoiceGeneration,
    VideoGeneration,
    Distribution,
}

impl DlqOperation {
    pub const ALL: [DlqOperation; 4] = [
        DlqOperation::TextGeneration,
        DlqOperation::VoiceGeneration,
        DlqOperation::VideoGeneration,
        DlqOperation::Distribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DlqOperation::TextGeneration => "text_generation",
            DlqOperation::VoiceGeneration => "voice_generation",
            DlqOperation::VideoGeneration => "video_generation",
            DlqOperation::Distribution => "distribution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == value)
    }
}

impl std::fmt::Display for DlqOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    Pending,
    Retrying,
    Failed,
    Resolved,
}

impl DlqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DlqStatus::Pending => "pending",
            DlqStatus::Retrying => "retrying",
            DlqStatus::Failed => "failed",
            DlqStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DlqStatus::Pending),
            "retrying" => Some(DlqStatus::Retrying),
            "failed" => Some(DlqStatus::Failed),
            "resolved" => Some(DlqStatus::Resolved),
            _ => None,
        }
    }
}

/// A terminally-failed stage call kept for replay.
///
/// `operation` stays a raw string: rows written by other tools may carry
/// operations this build does not know, and those must still be listable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub run_id: String,
    pub operation: String,
    pub status: DlqStatus,
    pub error: String,
    pub payload: serde_json::Value,
    pub payload_hash: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DlqEntry {
    pub fn operation_kind(&self) -> Option<DlqOperation> {
        DlqOperation::parse(&self.operation)
    }

    /// Whether the processor may still pick this entry up.
    pub fn is_retryable(&self) -> bool {
        self.status == DlqStatus::Pending && self.retry_count < self.max_retries
    }
}

/// Request to dead-letter a failed stage call.
#[derive(Debug, Clone)]
pub struct NewDlqEntry {
    pub run_id: String,
    pub operation: DlqOperation,
    pub error: String,
    pub payload: serde_json::Value,
    pub max_retries: u32,
}

/// Partial update applied by `DlqStore::update_entry`.
#[derive(Debug, Clone, Default)]
pub struct DlqUpdate {
    pub status: Option<DlqStatus>,
    pub error: Option<String>,
    pub retry_count: Option<u32>,
    pub max_retries: Option<u32>,
    /// Replaces the payload and its hash.
    pub payload: Option<serde_json::Value>,
}

/// Filter for querying DLQ entries.
#[derive(Debug, Clone)]
pub struct DlqFilter {
    pub status: Option<DlqStatus>,
    pub operation: Option<String>,
    pub run_id: Option<String>,
    /// Only entries with `retry_count < max_retries`.
    pub retryable_only: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for DlqFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl DlqFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            operation: None,
            run_id: None,
            retryable_only: false,
            limit: 100,
            offset: 0,
        }
    }

    /// Pending entries that still have replay budget.
    pub fn retryable() -> Self {
        Self {
            status: Some(DlqStatus::Pending),
            retryable_only: true,
            ..Self::new()
        }
    }

    pub fn with_status(mut self, status: DlqStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
