//! Run records: the run itself plus the logs and assets it owns.

mod logger;
mod sqlite_store;
mod store;
mod types;

pub use logger::RunLogger;
pub use sqlite_store::SqliteRunStore;
pub use store::{RunFilter, RunStore, StoreError};
pub use types::{
    Asset, AssetStatus, AssetType, LogEntry, LogLevel, NewAsset, NewLogEntry, Run, RunDetail,
    RunStatus, RunTrigger,
};
