//! Error types for the attribute record store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from record store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt attribute record {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    #[error("Not a record path: {path}")]
    InvalidRecordPath { path: PathBuf },

    #[error("Invalid lookup pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Transient failures are worth one retry; the sync client briefly
    /// holds locks on files it has just published.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}
