//! Stage executor: capabilities plus the run directory layout.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::{Config, TopicSourceKind};
use crate::dlq::DlqOperation;

use super::{
    validate_text_payload, AudioArtifact, AudioInput, AvatarVideoGenerator, DistributionInput,
    ElevenLabsVoice, ExternalTopicSource, InternalTopicSource, OpenAiTextGenerator,
    PlaceholderPublisher, PlaceholderTextGenerator, PlaceholderVideo, PlaceholderVoice, Publisher,
    Receipt, RunDirs, StageError, StageOutput, TextGenerator, TextInput, TextPayload, Topic,
    TopicSource, VideoArtifact, VideoGenerator, VideoInput, VoiceSynthesizer, WebhookPublisher,
};

/// Receipts collected across distribution attempts.
#[derive(Debug, Default)]
pub struct DeliveredReceipts {
    receipts: Mutex<Vec<Receipt>>,
}

impl DeliveredReceipts {
    pub fn new(receipts: Vec<Receipt>) -> Self {
        Self {
            receipts: Mutex::new(receipts),
        }
    }

    pub fn snapshot(&self) -> Vec<Receipt> {
        self.lock().clone()
    }

    fn contains(&self, platform: &str) -> bool {
        self.lock().iter().any(|r| r.platform == platform)
    }

    fn push(&self, receipt: Receipt) {
        self.lock().push(receipt);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Receipt>> {
        self.receipts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs single stages. Knows nothing about retries, runs or the DLQ.
pub struct StageExecutor {
    runs_dir: PathBuf,
    topic: Arc<dyn TopicSource>,
    text: Arc<dyn TextGenerator>,
    voice: Arc<dyn VoiceSynthesizer>,
    video: Arc<dyn VideoGenerator>,
    publishers: Vec<Arc<dyn Publisher>>,
}

impl StageExecutor {
    pub fn new(
        runs_dir: impl Into<PathBuf>,
        topic: Arc<dyn TopicSource>,
        text: Arc<dyn TextGenerator>,
        voice: Arc<dyn VoiceSynthesizer>,
        video: Arc<dyn VideoGenerator>,
        publishers: Vec<Arc<dyn Publisher>>,
    ) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            topic,
            text,
            voice,
            video,
            publishers,
        }
    }

    /// Every capability backed by its placeholder implementation.
    pub fn placeholders(runs_dir: impl Into<PathBuf>, platforms: &[&str]) -> Self {
        Self::new(
            runs_dir,
            Arc::new(InternalTopicSource::new()),
            Arc::new(PlaceholderTextGenerator::new()),
            Arc::new(PlaceholderVoice::new()),
            Arc::new(PlaceholderVideo::new()),
            platforms
                .iter()
                .map(|p| Arc::new(PlaceholderPublisher::new(*p)) as Arc<dyn Publisher>)
                .collect(),
        )
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn run_dirs(&self, run_id: &str) -> RunDirs {
        RunDirs::new(&self.runs_dir, run_id)
    }

    /// Names of the configured publishing platforms.
    pub fn platforms(&self) -> Vec<String> {
        self.publishers
            .iter()
            .map(|p| p.platform().to_string())
            .collect()
    }

    pub async fn topic(&self, run_id: &str) -> Result<Topic, StageError> {
        self.topic.select(run_id).await
    }

    /// Generate text. The payload is not validated here.
    pub async fn text(&self, input: &TextInput) -> Result<TextPayload, StageError> {
        let payload = self.text.generate(input).await?;
        if payload.placeholder {
            count_placeholder("text");
        }
        Ok(payload)
    }

    /// Write a validated payload to `<run>/text/payload.json`.
    pub async fn store_text(&self, run_id: &str, payload: &TextPayload) -> Result<String, StageError> {
        let dirs = self.run_dirs(run_id);
        tokio::fs::create_dir_all(dirs.text_dir()).await?;

        let json =
            serde_json::to_vec_pretty(payload).map_err(|e| StageError::Json(e.to_string()))?;
        let path = dirs.text_file();
        tokio::fs::write(&path, json).await?;
        Ok(path.display().to_string())
    }

    pub async fn audio(&self, input: &AudioInput) -> Result<AudioArtifact, StageError> {
        let dirs = self.run_dirs(&input.run_id);
        tokio::fs::create_dir_all(dirs.audio_dir()).await?;

        let artifact = self.voice.synthesize(input, &dirs.audio_file()).await?;
        if artifact.placeholder {
            count_placeholder("audio");
        }
        Ok(artifact)
    }

    pub async fn video(&self, input: &VideoInput) -> Result<VideoArtifact, StageError> {
        let dirs = self.run_dirs(&input.run_id);
        tokio::fs::create_dir_all(dirs.video_dir()).await?;

        let artifact = self.video.render(input, &dirs.video_file()).await?;
        if artifact.placeholder {
            count_placeholder("video");
        }
        Ok(artifact)
    }

    /// Publish concurrently to every platform without a receipt in
    /// `delivered`. Successful receipts are added to `delivered` even when
    /// another publisher fails, so a retry only calls the platforms still
    /// missing. Any publisher error fails the stage.
    pub async fn distribute(
        &self,
        input: &DistributionInput,
        delivered: &DeliveredReceipts,
    ) -> Result<Vec<Receipt>, StageError> {
        let pending: Vec<&Arc<dyn Publisher>> = self
            .publishers
            .iter()
            .filter(|p| !delivered.contains(p.platform()))
            .collect();
        if pending.len() < self.publishers.len() {
            info!(
                run_id = %input.run_id,
                skipped = self.publishers.len() - pending.len(),
                "Skipping platforms already published"
            );
        }

        let results = join_all(pending.iter().map(|p| p.publish(input))).await;

        let mut first_error = None;
        for (publisher, result) in pending.iter().zip(results) {
            match result {
                Ok(receipt) => delivered.push(receipt),
                Err(e) => {
                    warn!(
                        run_id = %input.run_id,
                        platform = %publisher.platform(),
                        error = %e,
                        "Publishing failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered.snapshot()),
        }
    }

    /// Re-run a dead-lettered operation from its serialized input.
    ///
    /// Text replays are validated and stored like a live run would.
    /// Distribution progress is written back into `payload`, so a failed
    /// replay keeps the receipts it did collect.
    pub async fn replay(
        &self,
        operation: DlqOperation,
        payload: &mut serde_json::Value,
    ) -> Result<StageOutput, StageError> {
        match operation {
            DlqOperation::TextGeneration => {
                let input: TextInput = parse_payload(payload)?;
                let text = self.text(&input).await?;
                validate_text_payload(&text)?;
                let path = self.store_text(&input.run_id, &text).await?;
                Ok(StageOutput::Text {
                    payload: text,
                    path,
                })
            }
            DlqOperation::VoiceGeneration => {
                let input: AudioInput = parse_payload(payload)?;
                Ok(StageOutput::Audio(self.audio(&input).await?))
            }
            DlqOperation::VideoGeneration => {
                let input: VideoInput = parse_payload(payload)?;
                Ok(StageOutput::Video(self.video(&input).await?))
            }
            DlqOperation::Distribution => {
                let mut input: DistributionInput = parse_payload(payload)?;
                let delivered = DeliveredReceipts::new(input.delivered.clone());
                let result = self.distribute(&input, &delivered).await;

                input.delivered = delivered.snapshot();
                if let Ok(updated) = serde_json::to_value(&input) {
                    *payload = updated;
                }
                Ok(StageOutput::Distribution(result?))
            }
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: &serde_json::Value,
) -> Result<T, StageError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| StageError::Json(format!("invalid replay payload: {}", e)))
}

fn count_placeholder(stage: &str) {
    crate::metrics::PLACEHOLDERS_USED
        .with_label_values(&[stage])
        .inc();
}

fn configured(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Build the executor from configuration.
///
/// A provider without credentials gets its placeholder implementation and
/// a warning; the pipeline still runs end to end.
pub fn build_stage_executor(config: &Config) -> StageExecutor {
    let topic: Arc<dyn TopicSource> = match (config.topic.source, &config.topic.external_url) {
        (TopicSourceKind::External, Some(url)) => {
            info!(url = %url, "Using external topic source");
            Arc::new(ExternalTopicSource::new(
                url.clone(),
                Duration::from_secs(config.topic.timeout_secs),
            ))
        }
        (TopicSourceKind::External, None) => {
            warn!("External topic source selected without a URL, using internal topics");
            Arc::new(InternalTopicSource::new())
        }
        (TopicSourceKind::Internal, _) => Arc::new(InternalTopicSource::new()),
    };

    let text_config = &config.providers.text;
    let text: Arc<dyn TextGenerator> = match configured(&text_config.api_key) {
        Some(key) => Arc::new(
            OpenAiTextGenerator::new(key, text_config.model.clone())
                .with_api_base(text_config.api_base.clone())
                .with_timeout(Duration::from_secs(text_config.timeout_secs)),
        ),
        None => {
            warn!("Text provider not configured, using placeholder scripts");
            Arc::new(PlaceholderTextGenerator::new())
        }
    };

    let voice_config = &config.providers.voice;
    let voice: Arc<dyn VoiceSynthesizer> = match configured(&voice_config.api_key) {
        Some(key) => Arc::new(
            ElevenLabsVoice::new(key, voice_config.voice_id.clone(), voice_config.model_id.clone())
                .with_api_base(voice_config.api_base.clone())
                .with_timeout(Duration::from_secs(voice_config.timeout_secs)),
        ),
        None => {
            warn!("Voice provider not configured, using placeholder audio");
            Arc::new(PlaceholderVoice::new())
        }
    };

    let video_config = &config.providers.video;
    let video: Arc<dyn VideoGenerator> = match (
        configured(&video_config.api_key),
        configured(&video_config.avatar_id),
    ) {
        (Some(key), Some(avatar_id)) => Arc::new(
            AvatarVideoGenerator::new(key, avatar_id)
                .with_api_base(video_config.api_base.clone())
                .with_polling(
                    Duration::from_secs(video_config.poll_interval_secs),
                    Duration::from_secs(video_config.max_wait_secs),
                ),
        ),
        (Some(_), None) => {
            warn!("Video provider has no avatar_id, using placeholder video");
            Arc::new(PlaceholderVideo::new())
        }
        (None, _) => {
            warn!("Video provider not configured, using placeholder video");
            Arc::new(PlaceholderVideo::new())
        }
    };

    let timeout = Duration::from_secs(config.distribution.timeout_secs);
    let publishers = config
        .distribution
        .platforms
        .iter()
        .map(|platform| -> Arc<dyn Publisher> {
            match configured(&platform.webhook_url) {
                Some(url) => {
                    let mut publisher =
                        WebhookPublisher::new(platform.name.clone(), url).with_timeout(timeout);
                    if let Some(token) = configured(&platform.token) {
                        publisher = publisher.with_token(token);
                    }
                    Arc::new(publisher)
                }
                None => {
                    info!(platform = %platform.name, "No webhook configured, receipts will be simulated");
                    Arc::new(PlaceholderPublisher::new(platform.name.clone()))
                }
            }
        })
        .collect();

    StageExecutor::new(
        config.storage.runs_dir.clone(),
        topic,
        text,
        voice,
        video,
        publishers,
    )
}
