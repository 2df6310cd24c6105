//! Library engine error types

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Library engine is closed")]
    Closed,

    #[error("Failed to open library engine ({kind}): {message}")]
    OpenFailed {
        kind: OpenFailureKind,
        message: String,
    },

    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),

    #[error("Invalid parent folder: {0}")]
    InvalidParent(String),

    #[error("Cannot delete built-in root: {0}")]
    CannotDeleteRoot(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] harbor_storage::StorageError),
}

/// Why the engine failed to open, for breadcrumbs and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailureKind {
    Busy,
    Corrupt,
    Unknown,
}

impl OpenFailureKind {
    pub(crate) fn classify(err: &LibraryError) -> Self {
        match err {
            LibraryError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => match e.code {
                rusqlite::ErrorCode::DatabaseBusy => OpenFailureKind::Busy,
                rusqlite::ErrorCode::NotADatabase => OpenFailureKind::Corrupt,
                _ => OpenFailureKind::Unknown,
            },
            _ => OpenFailureKind::Unknown,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            OpenFailureKind::Busy => "database-busy",
            OpenFailureKind::Corrupt => "not-a-database",
            OpenFailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OpenFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}
