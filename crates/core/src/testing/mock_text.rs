//! Mock topic source and text generator.

use async_trait::async_trait;

use crate::stages::{StageError, TextGenerator, TextInput, TextPayload, Topic, TopicSource};

use super::failure::{FailureScript, MockFailure};
use super::fixtures;

/// Topic source returning one fixed topic.
#[derive(Debug)]
pub struct MockTopicSource {
    topic: Topic,
    script: FailureScript,
}

impl MockTopicSource {
    pub fn new() -> Self {
        Self::with_topic(fixtures::topic("mock-topic", "Mock topic"))
    }

    pub fn with_topic(topic: Topic) -> Self {
        Self {
            topic,
            script: FailureScript::default(),
        }
    }

    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.script = FailureScript::always(failure);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.script.calls()
    }
}

impl Default for MockTopicSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicSource for MockTopicSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn select(&self, _run_id: &str) -> Result<Topic, StageError> {
        self.script.next("topic")?;
        Ok(self.topic.clone())
    }
}

/// Text generator with a configurable payload and failure script.
///
/// # Example
///
/// ```rust,ignore
/// use aurora_core::testing::{MockFailure, MockTextGenerator};
///
/// // Rate limited twice, then succeeds.
/// let text = MockTextGenerator::new().failing_times(MockFailure::RateLimited, 2);
/// ```
#[derive(Debug)]
pub struct MockTextGenerator {
    payload: TextPayload,
    script: FailureScript,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self {
            payload: fixtures::text_payload("Mock topic"),
            script: FailureScript::default(),
        }
    }

    /// Return this payload instead of the fixture. It is not validated.
    pub fn with_payload(mut self, payload: TextPayload) -> Self {
        self.payload = payload;
        self
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

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, _input: &TextInput) -> Result<TextPayload, StageError> {
        self.script.next("text")?;
        Ok(self.payload.clone())
    }
}
