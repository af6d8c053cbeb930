//! Stage inputs and outputs.
//!
//! Every input carries the run id plus whatever upstream output it consumes,
//! so a serialized input is enough to replay the stage later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dlq::DlqOperation;
use crate::run::{AssetStatus, AssetType, NewAsset};

use super::StageError;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Topic,
    Text,
    Audio,
    Video,
    Distribution,
}

impl Stage {
    pub const ORDERED: [Stage; 5] = [
        Stage::Topic,
        Stage::Text,
        Stage::Audio,
        Stage::Video,
        Stage::Distribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Topic => "topic",
            Stage::Text => "text",
            Stage::Audio => "audio",
            Stage::Video => "video",
            Stage::Distribution => "distribution",
        }
    }

    /// The DLQ operation this stage's failures are filed under. Topic
    /// selection is never dead-lettered.
    pub fn dlq_operation(&self) -> Option<DlqOperation> {
        match self {
            Stage::Topic => None,
            Stage::Text => Some(DlqOperation::TextGeneration),
            Stage::Audio => Some(DlqOperation::VoiceGeneration),
            Stage::Video => Some(DlqOperation::VideoGeneration),
            Stage::Distribution => Some(DlqOperation::Distribution),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject chosen for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub label: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextInput {
    pub run_id: String,
    pub topic: Topic,
}

/// A channel-specific variant of the primary script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivative {
    pub id: String,
    pub content: String,
}

/// Output of text generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub primary: String,
    #[serde(default)]
    pub derivatives: Vec<Derivative>,
    #[serde(default)]
    pub placeholder: bool,
}

/// Check that a text payload is usable downstream.
pub fn validate_text_payload(payload: &TextPayload) -> Result<(), StageError> {
    if payload.primary.trim().is_empty() {
        return Err(StageError::Validation(
            "text payload has an empty primary script".to_string(),
        ));
    }
    if payload.derivatives.is_empty() {
        return Err(StageError::Validation(
            "text payload has no derivatives".to_string(),
        ));
    }
    for (idx, derivative) in payload.derivatives.iter().enumerate() {
        if derivative.id.trim().is_empty() || derivative.content.trim().is_empty() {
            return Err(StageError::Validation(format!(
                "derivative {} has an empty id or content",
                idx
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInput {
    pub run_id: String,
    /// The primary script to narrate.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: String,
    pub bytes: u64,
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInput {
    pub run_id: String,
    pub audio_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub path: String,
    pub placeholder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionInput {
    pub run_id: String,
    pub text: TextPayload,
    pub audio_path: String,
    pub video_path: String,
    /// Receipts from earlier attempts. Their platforms are not published
    /// to again.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delivered: Vec<Receipt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Delivered,
    Simulated,
    Failed,
}

/// Proof of (attempted) delivery to one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub platform: String,
    pub status: ReceiptStatus,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What a stage produced, as returned by replay.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Text {
        payload: TextPayload,
        path: String,
    },
    Audio(AudioArtifact),
    Video(VideoArtifact),
    Distribution(Vec<Receipt>),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Text { .. } => Stage::Text,
            StageOutput::Audio(_) => Stage::Audio,
            StageOutput::Video(_) => Stage::Video,
            StageOutput::Distribution(_) => Stage::Distribution,
        }
    }

    /// The asset to persist for this output. Distribution produces none.
    pub fn asset(&self, run_id: &str) -> Option<NewAsset> {
        let (asset_type, path, metadata) = match self {
            StageOutput::Distribution(_) => return None,
            StageOutput::Text { payload, path } => (
                AssetType::Text,
                path.clone(),
                serde_json::to_value(payload).ok(),
            ),
            StageOutput::Audio(audio) => (
                AssetType::Audio,
                audio.path.clone(),
                Some(json!({ "bytes": audio.bytes, "placeholder": audio.placeholder })),
            ),
            StageOutput::Video(video) => (
                AssetType::Video,
                video.path.clone(),
                Some(json!({ "placeholder": video.placeholder, "job_id": video.job_id })),
            ),
        };

        Some(NewAsset {
            run_id: run_id.to_string(),
            asset_type,
            path: Some(path),
            metadata,
            status: AssetStatus::Generated,
        })
    }
}
