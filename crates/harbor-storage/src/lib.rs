//! Harbor Storage Layer
//!
//! SQLite-based persistence shared by the sync-facing stores.
//! All access is funneled through serialized execution queues, one
//! statement batch at a time.

mod database;
mod error;
mod events;
mod migrations;
mod queue;
mod report;

pub use database::Database;
pub use error::StorageError;
pub use events::{EventBus, StorageEvent};
pub use queue::SerialQueue;
pub use report::{ErrorReporter, LogReporter, Severity};

pub type Result<T> = std::result::Result<T, StorageError>;
