//! Narration.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{AudioArtifact, AudioInput, StageError, VoiceSynthesizer};

/// Longest script the provider accepts in one request.
const MAX_TEXT_CHARS: usize = 5000;

/// Text-to-speech over HTTP, writing the returned MP3 bytes to disk.
pub struct ElevenLabsVoice {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    voice_id: String,
    model_id: String,
    timeout: Duration,
}

impl ElevenLabsVoice {
    pub fn new(
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: "https://api.elevenlabs.io".to_string(),
            voice_id: voice_id.into(),
            model_id: model_id.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn truncate_script(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: String,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[async_trait]
impl VoiceSynthesizer for ElevenLabsVoice {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(
        &self,
        input: &AudioInput,
        output: &Path,
    ) -> Result<AudioArtifact, StageError> {
        let request = SpeechRequest {
            text: truncate_script(&input.text),
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.api_base, self.voice_id
            ))
            .header("xi-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.timeout))?;
        tokio::fs::write(output, &bytes).await?;

        info!(
            run_id = %input.run_id,
            path = %output.display(),
            kb = bytes.len() / 1024,
            "Audio generated"
        );

        Ok(AudioArtifact {
            path: output.display().to_string(),
            bytes: bytes.len() as u64,
            placeholder: false,
        })
    }
}

/// Writes a marker file instead of real audio.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderVoice;

impl PlaceholderVoice {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VoiceSynthesizer for PlaceholderVoice {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn synthesize(
        &self,
        input: &AudioInput,
        output: &Path,
    ) -> Result<AudioArtifact, StageError> {
        let marker = format!("Placeholder audio for run {}\n", input.run_id);
        tokio::fs::write(output, marker.as_bytes()).await?;
        Ok(AudioArtifact {
            path: output.display().to_string(),
            bytes: marker.len() as u64,
            placeholder: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placeholder_writes_marker() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("main.mp3");
        let input = AudioInput {
            run_id: "run-1".to_string(),
            text: "Script".to_string(),
        };

        let artifact = PlaceholderVoice::new()
            .synthesize(&input, &output)
            .await
            .unwrap();

        assert!(artifact.placeholder);
        assert!(output.exists());
        assert_eq!(artifact.bytes, std::fs::metadata(&output).unwrap().len());
    }

    #[test]
    fn test_request_truncates_long_scripts() {
        let text = "é".repeat(MAX_TEXT_CHARS + 10);
        assert_eq!(truncate_script(&text).chars().count(), MAX_TEXT_CHARS);
        assert_eq!(truncate_script("short"), "short");
    }
}
