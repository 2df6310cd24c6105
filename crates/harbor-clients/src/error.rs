//! Clients store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientsError {
    #[error("Storage error: {0}")]
    Storage(#[from] harbor_storage::StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
