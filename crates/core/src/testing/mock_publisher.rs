//! Mock distribution publisher.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::stages::{DistributionInput, Publisher, Receipt, ReceiptStatus, StageError};

use super::failure::{FailureScript, MockFailure};

/// Publisher that records what it was asked to publish.
#[derive(Debug)]
pub struct MockPublisher {
    platform: String,
    script: FailureScript,
    published: Mutex<Vec<String>>,
}

impl MockPublisher {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            script: FailureScript::default(),
            published: Mutex::new(Vec::new()),
        }
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

    /// Run ids successfully published, in call order.
    pub fn published_runs(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|runs| runs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn publish(&self, input: &DistributionInput) -> Result<Receipt, StageError> {
        self.script.next(&self.platform)?;
        if let Ok(mut runs) = self.published.lock() {
            runs.push(input.run_id.clone());
        }
        Ok(Receipt {
            platform: self.platform.clone(),
            status: ReceiptStatus::Delivered,
            run_id: input.run_id.clone(),
            external_id: Some(format!("mock-{}-{}", self.platform, input.run_id)),
            timestamp: Utc::now(),
        })
    }
}
