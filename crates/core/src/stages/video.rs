//! Avatar video rendering (submit, poll, download).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{StageError, VideoArtifact, VideoGenerator, VideoInput};

/// Submits a render job and polls until it completes or the wait budget
/// runs out. A job that outlives the budget yields a placeholder file
/// instead of failing the run.
pub struct AvatarVideoGenerator {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    avatar_id: String,
    poll_interval: Duration,
    max_wait: Duration,
    request_timeout: Duration,
}

impl AvatarVideoGenerator {
    pub fn new(api_key: impl Into<String>, avatar_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: "https://api.heygen.com".to_string(),
            avatar_id: avatar_id.into(),
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(600),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    async fn submit(&self, input: &VideoInput) -> Result<String, StageError> {
        let request = SubmitRequest {
            avatar_id: &self.avatar_id,
            audio_path: &input.audio_path,
            title: &input.run_id,
        };

        let response = self
            .client
            .post(format!("{}/v2/video/generate", self.api_base))
            .header("X-Api-Key", &self.api_key)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.request_timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let submitted: Envelope<SubmitData> = response
            .json()
            .await
            .map_err(|e| StageError::Json(e.to_string()))?;

        Ok(submitted.data.video_id)
    }

    async fn poll_status(&self, job_id: &str) -> Result<JobStatus, StageError> {
        let response = self
            .client
            .get(format!("{}/v1/video_status.get", self.api_base))
            .query(&[("video_id", job_id)])
            .header("X-Api-Key", &self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.request_timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let envelope: Envelope<JobStatus> = response
            .json()
            .await
            .map_err(|e| StageError::Json(e.to_string()))?;

        Ok(envelope.data)
    }

    async fn download(&self, url: &str, output: &Path) -> Result<(), StageError> {
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.request_timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.request_timeout))?;
        tokio::fs::write(output, &bytes).await?;
        Ok(())
    }

    /// Poll until the job completes, then download the result.
    async fn await_job(
        &self,
        input: &VideoInput,
        job_id: &str,
        output: &Path,
    ) -> Result<VideoArtifact, StageError> {
        loop {
            let job = self.poll_status(job_id).await?;
            debug!(run_id = %input.run_id, job_id = %job_id, status = %job.status, "Polled video job");

            match job.status.as_str() {
                "completed" => {
                    let url = job.video_url.ok_or_else(|| {
                        StageError::Json("completed video job has no video_url".to_string())
                    })?;
                    self.download(&url, output).await?;
                    info!(run_id = %input.run_id, path = %output.display(), "Video generated");
                    return Ok(VideoArtifact {
                        path: output.display().to_string(),
                        placeholder: false,
                        job_id: Some(job_id.to_string()),
                    });
                }
                "failed" => {
                    let message = job
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "video job failed".to_string());
                    return Err(StageError::Api {
                        status: 200,
                        message,
                    });
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    avatar_id: &'a str,
    audio_path: &'a str,
    title: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[async_trait]
impl VideoGenerator for AvatarVideoGenerator {
    fn name(&self) -> &str {
        "avatar"
    }

    async fn render(&self, input: &VideoInput, output: &Path) -> Result<VideoArtifact, StageError> {
        let job_id = self.submit(input).await?;
        info!(run_id = %input.run_id, job_id = %job_id, "Submitted video job");

        // Polling and download share one budget.
        match tokio::time::timeout(self.max_wait, self.await_job(input, &job_id, output)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    run_id = %input.run_id,
                    job_id = %job_id,
                    max_wait_secs = self.max_wait.as_secs(),
                    "Video job did not finish in time, writing placeholder"
                );
                let mut artifact = write_placeholder(input, output).await?;
                artifact.job_id = Some(job_id);
                Ok(artifact)
            }
        }
    }
}

async fn write_placeholder(input: &VideoInput, output: &Path) -> Result<VideoArtifact, StageError> {
    let marker = format!(
        "Placeholder video for run {} (audio: {})\n",
        input.run_id, input.audio_path
    );
    tokio::fs::write(output, marker.as_bytes()).await?;
    Ok(VideoArtifact {
        path: output.display().to_string(),
        placeholder: true,
        job_id: None,
    })
}

/// Writes a marker file instead of a rendered video.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderVideo;

impl PlaceholderVideo {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoGenerator for PlaceholderVideo {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn render(&self, input: &VideoInput, output: &Path) -> Result<VideoArtifact, StageError> {
        write_placeholder(input, output).await
    }
}
