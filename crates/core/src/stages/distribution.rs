//! Publishing to distribution platforms.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{DistributionInput, Publisher, Receipt, ReceiptStatus, StageError};

/// Posts a JSON announcement to a platform webhook.
pub struct WebhookPublisher {
    client: reqwest::Client,
    platform: String,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl WebhookPublisher {
    pub fn new(platform: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            platform: platform.into(),
            url: url.into(),
            token: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct Announcement<'a> {
    platform: &'a str,
    run_id: &'a str,
    primary: &'a str,
    /// The derivative matching this platform, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    post: Option<&'a str>,
    audio_path: &'a str,
    video_path: &'a str,
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    id: Option<String>,
}

#[async_trait]
impl Publisher for WebhookPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn publish(&self, input: &DistributionInput) -> Result<Receipt, StageError> {
        let announcement = Announcement {
            platform: &self.platform,
            run_id: &input.run_id,
            primary: &input.text.primary,
            post: input
                .text
                .derivatives
                .iter()
                .find(|d| d.id == self.platform)
                .map(|d| d.content.as_str()),
            audio_path: &input.audio_path,
            video_path: &input.video_path,
        };

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&announcement);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        // The body is optional; an unparseable one still counts as delivered.
        let external_id = response
            .json::<WebhookResponse>()
            .await
            .ok()
            .and_then(|r| r.id);

        info!(run_id = %input.run_id, platform = %self.platform, "Delivered to platform");

        Ok(Receipt {
            platform: self.platform.clone(),
            status: ReceiptStatus::Delivered,
            run_id: input.run_id.clone(),
            external_id,
            timestamp: Utc::now(),
        })
    }
}

/// Returns a simulated receipt without contacting anything.
#[derive(Debug, Clone)]
pub struct PlaceholderPublisher {
    platform: String,
}

impl PlaceholderPublisher {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl Publisher for PlaceholderPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn publish(&self, input: &DistributionInput) -> Result<Receipt, StageError> {
        Ok(Receipt {
            platform: self.platform.clone(),
            status: ReceiptStatus::Simulated,
            run_id: input.run_id.clone(),
            external_id: None,
            timestamp: Utc::now(),
        })
    }
}
