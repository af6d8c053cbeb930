//! Mock voice and video capabilities. Both write small files so downstream
//! path checks behave as with real providers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::stages::{
    AudioArtifact, AudioInput, StageError, VideoArtifact, VideoGenerator, VideoInput,
    VoiceSynthesizer,
};

use super::failure::{FailureScript, MockFailure};

const MOCK_AUDIO: &[u8] = b"ID3mock-audio";
const MOCK_VIDEO: &[u8] = b"mock-video";

#[derive(Debug, Default)]
pub struct MockVoice {
    script: FailureScript,
}

impl MockVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.script = FailureScript::always(failure);
        self
    }

    pub fn failing_times(mut self, failure: MockFailure, times: u32) -> Self {
        self.script = FailureScript::first(failure, times);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl VoiceSynthesizer for MockVoice {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(
        &self,
        _input: &AudioInput,
        output: &Path,
    ) -> Result<AudioArtifact, StageError> {
        self.script.next("voice")?;
        tokio::fs::write(output, MOCK_AUDIO).await?;
        Ok(AudioArtifact {
            path: output.display().to_string(),
            bytes: MOCK_AUDIO.len() as u64,
            placeholder: false,
        })
    }
}

#[derive(Debug, Default)]
pub struct MockVideo {
    script: FailureScript,
    render_time: Option<Duration>,
}

impl MockVideo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.script = FailureScript::always(failure);
        self
    }

    pub fn failing_times(mut self, failure: MockFailure, times: u32) -> Self {
        self.script = FailureScript::first(failure, times);
        self
    }

    /// Sleep this long before producing the file, like a slow render job.
    pub fn with_render_time(mut self, render_time: Duration) -> Self {
        self.render_time = Some(render_time);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.script.calls()
    }
}

#[async_trait]
impl VideoGenerator for MockVideo {
    fn name(&self) -> &str {
        "mock"
    }

    async fn render(&self, input: &VideoInput, output: &Path) -> Result<VideoArtifact, StageError> {
        self.script.next("video")?;
        if let Some(render_time) = self.render_time {
            tokio::time::sleep(render_time).await;
        }
        tokio::fs::write(output, MOCK_VIDEO).await?;
        Ok(VideoArtifact {
            path: output.display().to_string(),
            placeholder: false,
            job_id: Some(format!("mock-job-{}", input.run_id)),
        })
    }
}
