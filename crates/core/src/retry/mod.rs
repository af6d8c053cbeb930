//! Bounded retry with exponential backoff around any fallible async call.
//!
//! The wrapper knows nothing about stages: it drives an opaque future
//! factory, sleeps between failed attempts and, once the budget is spent,
//! optionally dead-letters the call before handing the last error back.

mod policy;

pub use policy::RetryPolicy;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::dlq::{enqueue_dead_letter, DlqOperation, DlqStore, EnqueueOutcome, NewDlqEntry};

/// Errors the wrapper can classify.
pub trait RetryableError: std::error::Error {
    /// Rate-limit errors back off from a longer base delay.
    fn is_rate_limited(&self) -> bool;
}

/// Returned when every attempt failed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        attempts: u32,
        #[source]
        last_error: E,
        /// Set when a dead letter was requested.
        dead_letter: Option<DeadLetterOutcome>,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
        }
    }

    pub fn dead_letter(&self) -> Option<DeadLetterOutcome> {
        match self {
            RetryError::Exhausted { dead_letter, .. } => *dead_letter,
        }
    }
}

/// What happened when an exhausted call was handed to the DLQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterOutcome {
    Created,
    /// An entry for the same run and operation was already there.
    AlreadyExists,
    /// The entry could not be persisted.
    Failed,
}

/// Input of a dead-lettered call, serialized for replay.
#[derive(Clone)]
pub enum ReplayPayload {
    Fixed(serde_json::Value),
    /// Built when the call is dead-lettered, for calls that record partial
    /// progress across attempts.
    Deferred(Arc<dyn Fn() -> serde_json::Value + Send + Sync>),
}

impl ReplayPayload {
    pub fn deferred(build: impl Fn() -> serde_json::Value + Send + Sync + 'static) -> Self {
        ReplayPayload::Deferred(Arc::new(build))
    }

    pub fn resolve(&self) -> serde_json::Value {
        match self {
            ReplayPayload::Fixed(value) => value.clone(),
            ReplayPayload::Deferred(build) => build(),
        }
    }
}

impl From<serde_json::Value> for ReplayPayload {
    fn from(value: serde_json::Value) -> Self {
        ReplayPayload::Fixed(value)
    }
}

/// Where to persist a call that exhausted its retries.
#[derive(Clone)]
pub struct DeadLetter {
    pub store: Arc<dyn DlqStore>,
    pub run_id: String,
    pub operation: DlqOperation,
    pub payload: ReplayPayload,
    pub max_retries: u32,
}

impl DeadLetter {
    /// Persist the failure, skipping if an entry already exists.
    ///
    /// Persistence errors are logged and reported as `Failed`, never
    /// returned, so they cannot mask the stage error the caller is about
    /// to see.
    pub fn record(&self, error_message: &str) -> DeadLetterOutcome {
        let request = NewDlqEntry {
            run_id: self.run_id.clone(),
            operation: self.operation,
            error: error_message.to_string(),
            payload: self.payload.resolve(),
            max_retries: self.max_retries,
        };

        match enqueue_dead_letter(self.store.as_ref(), request) {
            Ok(EnqueueOutcome::Created(entry)) => {
                warn!(
                    run_id = %self.run_id,
                    operation = %self.operation,
                    dlq_id = %entry.id,
                    "Dead-lettered failed call"
                );
                DeadLetterOutcome::Created
            }
            Ok(EnqueueOutcome::AlreadyExists) => DeadLetterOutcome::AlreadyExists,
            Err(e) => {
                error!(
                    run_id = %self.run_id,
                    operation = %self.operation,
                    error = %e,
                    "Failed to persist DLQ entry"
                );
                DeadLetterOutcome::Failed
            }
        }
    }
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// `operation` receives the 0-based attempt index. `stage` labels logs and
/// metrics only. No sleep happens after the final attempt.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    stage: &str,
    mut operation: F,
    dead_letter: Option<DeadLetter>,
) -> Result<T, RetryError<E>>
where
    E: RetryableError,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(stage, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let rate_limited = e.is_rate_limited();

                if !policy.has_attempt_after(attempt) {
                    let attempts = attempt + 1;
                    warn!(stage, attempts, error = %e, "Retries exhausted");
                    let dead_letter = dead_letter
                        .as_ref()
                        .map(|dead_letter| dead_letter.record(&e.to_string()));
                    return Err(RetryError::Exhausted {
                        attempts,
                        last_error: e,
                        dead_letter,
                    });
                }

                let delay = policy.delay_for(attempt, rate_limited);
                let kind = if rate_limited { "rate_limited" } else { "error" };
                crate::metrics::RETRY_ATTEMPTS
                    .with_label_values(&[stage, kind])
                    .inc();
                warn!(
                    stage,
                    attempt,
                    rate_limited,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, backing off"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
