//! Scripted failures shared by the mock capabilities.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::stages::StageError;

/// Kind of error a mock produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// HTTP 429.
    RateLimited,
    /// Transport failure.
    Http,
    /// Non-success response with the given status.
    Api(u16),
    Timeout,
}

impl MockFailure {
    pub fn to_error(self, context: &str) -> StageError {
        match self {
            MockFailure::RateLimited => StageError::RateLimited(format!("{}: too many requests", context)),
            MockFailure::Http => StageError::Http(format!("{}: connection refused", context)),
            MockFailure::Api(status) => StageError::Api {
                status,
                message: format!("{}: mock failure", context),
            },
            MockFailure::Timeout => StageError::Timeout(Duration::from_secs(30)),
        }
    }
}

/// Counts calls and decides which of them fail.
#[derive(Debug, Default)]
pub(crate) struct FailureScript {
    failure: Option<MockFailure>,
    /// `None` fails every call.
    times: Option<u32>,
    calls: AtomicU32,
}

impl FailureScript {
    pub(crate) fn always(failure: MockFailure) -> Self {
        Self {
            failure: Some(failure),
            times: None,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn first(failure: MockFailure, times: u32) -> Self {
        Self {
            failure: Some(failure),
            times: Some(times),
            calls: AtomicU32::new(0),
        }
    }

    /// Record a call; `Err` if this one is scripted to fail.
    pub(crate) fn next(&self, context: &str) -> Result<(), StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.failure, self.times) {
            (Some(failure), None) => Err(failure.to_error(context)),
            (Some(failure), Some(times)) if call < times => Err(failure.to_error(context)),
            _ => Ok(()),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}
