//! Capability traits, one per external dependency of the pipeline.

use std::path::Path;

use async_trait::async_trait;

use super::{
    AudioArtifact, AudioInput, DistributionInput, Receipt, StageError, TextInput, TextPayload,
    Topic, VideoArtifact, VideoInput,
};

#[async_trait]
pub trait TopicSource: Send + Sync {
    fn name(&self) -> &str;

    async fn select(&self, run_id: &str) -> Result<Topic, StageError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a script and its derivatives. Validation is the caller's job.
    async fn generate(&self, input: &TextInput) -> Result<TextPayload, StageError>;
}

#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Narrate `input.text` into `output`. The parent directory exists.
    async fn synthesize(&self, input: &AudioInput, output: &Path)
        -> Result<AudioArtifact, StageError>;
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Render a video for the narration into `output`. The parent directory exists.
    async fn render(&self, input: &VideoInput, output: &Path) -> Result<VideoArtifact, StageError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Platform this publisher delivers to.
    fn platform(&self) -> &str;

    async fn publish(&self, input: &DistributionInput) -> Result<Receipt, StageError>;
}
