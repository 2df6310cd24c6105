//! Sync support error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Secret store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
