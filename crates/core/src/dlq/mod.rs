//! Dead-letter queue for stage calls that exhausted their retries.
//!
//! An entry holds the serialized stage input so the [`DlqProcessor`] can
//! replay it later. At most one entry exists per (run_id, operation).

mod hash;
mod processor;
mod sqlite;
mod store;
mod types;

pub use hash::payload_hash;
pub use processor::{DlqProcessReport, DlqProcessor, DlqProcessorStatus};
pub use sqlite::SqliteDlqStore;
pub use store::{enqueue_dead_letter, DlqError, DlqStore, EnqueueOutcome};
pub use types::{DlqEntry, DlqFilter, DlqOperation, DlqStatus, DlqUpdate, NewDlqEntry};
