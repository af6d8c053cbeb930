//! Script generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Derivative, StageError, TextGenerator, TextInput, TextPayload};

const SYSTEM_PROMPT: &str = "You write short informative video scripts. \
Reply with a JSON object: {\"primary\": string, \"derivatives\": [{\"id\": string, \"content\": string}]}. \
`primary` is a narration script of about 150 words. \
Include a \"tweet\" derivative (max 280 characters) and a \"linkedin\" derivative.";

/// Chat-completion client asking for a JSON text payload.
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    timeout: Duration,
}

impl OpenAiTextGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: "https://api.openai.com".to_string(),
            model: model.into(),
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

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, input: &TextInput) -> Result<TextPayload, StageError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Topic: {}", input.topic.label),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            temperature: 0.7,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
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

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| StageError::Json(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| StageError::Json("completion has no content".to_string()))?;

        debug!(run_id = %input.run_id, bytes = content.len(), "Received completion");

        serde_json::from_str(&content).map_err(|e| StageError::Json(format!("{}: {}", e, content)))
    }
}

/// Deterministic script used when no text provider is configured.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderTextGenerator;

impl PlaceholderTextGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextGenerator for PlaceholderTextGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, input: &TextInput) -> Result<TextPayload, StageError> {
        let label = &input.topic.label;
        Ok(TextPayload {
            primary: format!(
                "This is a generated script for topic: {}. It contains informative content about the subject.",
                label
            ),
            derivatives: vec![
                Derivative {
                    id: "tweet".to_string(),
                    content: format!("Check out {}! #aurora", label),
                },
                Derivative {
                    id: "linkedin".to_string(),
                    content: format!("Professional insights on {}.", label),
                },
            ],
            placeholder: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{validate_text_payload, Topic};

    fn input() -> TextInput {
        TextInput {
            run_id: "run-1".to_string(),
            topic: Topic {
                id: "t1".to_string(),
                label: "Cloud Computing Trends".to_string(),
                weight: 1.0,
                metadata: serde_json::Value::Null,
            },
        }
    }

    #[tokio::test]
    async fn test_placeholder_is_valid_and_marked() {
        let payload = PlaceholderTextGenerator::new()
            .generate(&input())
            .await
            .unwrap();

        assert!(payload.placeholder);
        assert!(payload.primary.contains("Cloud Computing Trends"));
        assert_eq!(payload.derivatives.len(), 2);
        assert_eq!(payload.derivatives[0].id, "tweet");
        assert!(validate_text_payload(&payload).is_ok());
    }

    #[test]
    fn test_completion_content_parses_into_payload() {
        let content = r#"{"primary":"Script","derivatives":[{"id":"tweet","content":"Hi"}]}"#;
        let payload: TextPayload = serde_json::from_str(content).unwrap();
        assert!(!payload.placeholder);
        assert_eq!(payload.derivatives[0].content, "Hi");
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_http_error() {
        let generator = OpenAiTextGenerator::new("sk-test", "gpt-4o-mini")
            .with_api_base("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(1));

        let err = generator.generate(&input()).await.unwrap_err();
        assert!(matches!(err, StageError::Http(_) | StageError::Timeout(_)));
    }
}
