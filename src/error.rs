use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid dimension filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid round schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(u32),

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import error for {kind}: {message}")]
    Import { kind: String, message: String },

    #[error("Source error: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors that reject a request before any retrieval starts.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Error::InvalidRange(_)
                | Error::InvalidFilter(_)
                | Error::InvalidSchedule(_)
                | Error::InvalidPageSize(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
