//! Error types for paged-rowset

use thiserror::Error;

use crate::rowset::ConflictEntry;

/// Library-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[source] sqlx::Error),

    #[error("Sync conflict: {} divergent value(s)", conflicts.len())]
    SyncConflict { conflicts: Vec<ConflictEntry> },

    #[error("Unknown data source: {0}")]
    UnknownDataSource(String),

    #[error("Failed to load configuration from {path}: {message}")]
    ConfigLoad { path: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("Cursor is not positioned on a row")]
    NoCurrentRow,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn config_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Conflicts carried by a [`Error::SyncConflict`], if this is one
    pub fn conflicts(&self) -> Option<&[ConflictEntry]> {
        match self {
            Error::SyncConflict { conflicts } => Some(conflicts),
            _ => None,
        }
    }

    /// Whether the caller is expected to handle this error programmatically
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::SyncConflict { .. })
    }
}
