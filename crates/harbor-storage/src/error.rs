//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("Execution queue '{0}' is no longer running")]
    QueueUnavailable(String),
}

impl StorageError {
    /// Classify a row-mapping failure: column decode problems become
    /// `MalformedRow`, everything else stays an engine error.
    pub(crate) fn from_row_error(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::InvalidColumnType(_, _, _)
            | rusqlite::Error::InvalidColumnIndex(_)
            | rusqlite::Error::InvalidColumnName(_)
            | rusqlite::Error::FromSqlConversionFailure(_, _, _)
            | rusqlite::Error::IntegralValueOutOfRange(_, _) => {
                StorageError::MalformedRow(err.to_string())
            }
            other => StorageError::Sqlite(other),
        }
    }
}
