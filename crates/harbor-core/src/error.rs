//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] harbor_storage::StorageError),

    #[error("Clients error: {0}")]
    Clients(#[from] harbor_clients::ClientsError),

    #[error("Library error: {0}")]
    Library(#[from] harbor_library::LibraryError),

    #[error("Sync error: {0}")]
    Sync(#[from] harbor_sync::SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
