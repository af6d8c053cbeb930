//! Topic selection: a built-in list, or an external endpoint with fallback.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{StageError, Topic, TopicSource};

const BUILTIN_TOPICS: &[&str] = &[
    "Artificial Intelligence Revolution",
    "Cloud Computing Trends",
    "Blockchain Technology",
    "Cybersecurity Best Practices",
    "Data Science Applications",
    "DevOps Innovations",
    "Machine Learning Models",
    "Web Development Frameworks",
    "API Design Patterns",
    "Microservices Architecture",
];

/// Picks a topic from the built-in list.
#[derive(Debug, Default, Clone)]
pub struct InternalTopicSource;

impl InternalTopicSource {
    pub fn new() -> Self {
        Self
    }

    fn pick(&self) -> Topic {
        let id = uuid::Uuid::new_v4();
        let label = BUILTIN_TOPICS[(id.as_u128() % BUILTIN_TOPICS.len() as u128) as usize];

        Topic {
            id: id.to_string(),
            label: label.to_string(),
            weight: 1.0,
            metadata: json!({
                "source": "internal",
                "timestamp": Utc::now().to_rfc3339(),
            }),
        }
    }
}

#[async_trait]
impl TopicSource for InternalTopicSource {
    fn name(&self) -> &str {
        "internal"
    }

    async fn select(&self, run_id: &str) -> Result<Topic, StageError> {
        let topic = self.pick();
        info!(run_id, topic = %topic.label, "Selected internal topic");
        Ok(topic)
    }
}

#[derive(Debug, Deserialize)]
struct ExternalTopic {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
    weight: Option<f64>,
    metadata: Option<serde_json::Value>,
}

/// Fetches a topic from a configured endpoint. Any failure falls back to
/// the built-in list, so this source never fails a run.
pub struct ExternalTopicSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    fallback: InternalTopicSource,
}

impl ExternalTopicSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
            fallback: InternalTopicSource::new(),
        }
    }

    async fn fetch(&self) -> Result<Topic, StageError> {
        let response = self
            .client
            .get(&self.url)
            .header("User-Agent", "Aurora-Pipeline/1.0")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StageError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, &body));
        }

        let data: ExternalTopic = response
            .json()
            .await
            .map_err(|e| StageError::Json(e.to_string()))?;

        if data.id.is_empty() || data.label.is_empty() {
            return Err(StageError::Validation(
                "external topic response is missing id or label".to_string(),
            ));
        }

        Ok(Topic {
            id: data.id,
            label: data.label,
            weight: data.weight.unwrap_or(1.0),
            metadata: data.metadata.unwrap_or_else(|| json!({ "source": "external" })),
        })
    }
}

#[async_trait]
impl TopicSource for ExternalTopicSource {
    fn name(&self) -> &str {
        "external"
    }

    async fn select(&self, run_id: &str) -> Result<Topic, StageError> {
        match self.fetch().await {
            Ok(topic) => {
                info!(run_id, topic = %topic.label, "Fetched external topic");
                Ok(topic)
            }
            Err(e) => {
                warn!(run_id, url = %self.url, error = %e, "External topic failed, using internal list");
                self.fallback.select(run_id).await
            }
        }
    }
}
