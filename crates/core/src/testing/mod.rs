//! Testing utilities and mock implementations of the stage capabilities.
//!
//! Lets the orchestrator, retry wrapper and DLQ processor be exercised
//! end to end without any provider credentials.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use aurora_core::testing::{MockFailure, MockStages, MockTextGenerator};
//!
//! let mut stages = MockStages::new(&["twitter", "youtube"]);
//! stages.text = Arc::new(MockTextGenerator::new().failing(MockFailure::RateLimited));
//! let executor = stages.executor(runs_dir);
//!
//! // ... run the pipeline ...
//! assert_eq!(stages.text.call_count(), 3);
//! ```

mod failing_dlq;
mod failure;
mod mock_media;
mod mock_publisher;
mod mock_text;

pub use failing_dlq::FailingDlqStore;
pub use failure::MockFailure;
pub use mock_media::{MockVideo, MockVoice};
pub use mock_publisher::MockPublisher;
pub use mock_text::{MockTextGenerator, MockTopicSource};

use std::path::Path;
use std::sync::Arc;

use crate::stages::{Publisher, StageExecutor};

/// A full set of mock capabilities. Keep the handles to inspect call
/// counts after the run.
#[derive(Debug, Clone)]
pub struct MockStages {
    pub topic: Arc<MockTopicSource>,
    pub text: Arc<MockTextGenerator>,
    pub voice: Arc<MockVoice>,
    pub video: Arc<MockVideo>,
    pub publishers: Vec<Arc<MockPublisher>>,
}

impl MockStages {
    /// Every capability succeeding, one publisher per platform.
    pub fn new(platforms: &[&str]) -> Self {
        Self {
            topic: Arc::new(MockTopicSource::new()),
            text: Arc::new(MockTextGenerator::new()),
            voice: Arc::new(MockVoice::new()),
            video: Arc::new(MockVideo::new()),
            publishers: platforms
                .iter()
                .map(|p| Arc::new(MockPublisher::new(*p)))
                .collect(),
        }
    }

    /// Build an executor writing under `runs_dir`.
    pub fn executor(&self, runs_dir: &Path) -> StageExecutor {
        StageExecutor::new(
            runs_dir,
            self.topic.clone(),
            self.text.clone(),
            self.voice.clone(),
            self.video.clone(),
            self.publishers
                .iter()
                .map(|p| p.clone() as Arc<dyn Publisher>)
                .collect(),
        )
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use serde_json::json;

    use crate::config::{Config, PipelineConfig, PlatformConfig};
    use crate::stages::{Derivative, TextPayload, Topic};

    /// Configuration with placeholder providers, storage under `root`.
    pub fn config(root: &Path, platforms: &[&str]) -> Config {
        let mut config = Config::with_pipeline(PipelineConfig {
            enabled: true,
            allow_concurrent_runs: false,
        });
        config.database.path = root.join("aurora.db");
        config.storage.runs_dir = root.join("runs");
        config.distribution.platforms = platforms.iter().map(|p| PlatformConfig::named(*p)).collect();
        config
    }

    pub fn topic(id: &str, label: &str) -> Topic {
        Topic {
            id: id.to_string(),
            label: label.to_string(),
            weight: 1.0,
            metadata: json!({ "source": "test" }),
        }
    }

    /// A payload that passes validation.
    pub fn text_payload(label: &str) -> TextPayload {
        TextPayload {
            primary: format!("Today we talk about {}.", label),
            derivatives: vec![
                Derivative {
                    id: "twitter".to_string(),
                    content: format!("New video: {}", label),
                },
                Derivative {
                    id: "linkedin".to_string(),
                    content: format!("This week we look at {}.", label),
                },
            ],
            placeholder: false,
        }
    }

    /// A payload with no derivatives, rejected by validation.
    pub fn invalid_text_payload() -> TextPayload {
        TextPayload {
            primary: "Script without derivatives".to_string(),
            derivatives: vec![],
            placeholder: false,
        }
    }
}
