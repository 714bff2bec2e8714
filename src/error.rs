//! Error types for the repository publisher.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that abort a publishing run.
#[derive(Error, Debug)]
pub enum Error {
    /// The repository lock could not be taken within the retry budget.
    #[error("repository lock still held after {attempts} attempts: {last}")]
    LockConflict {
        /// Number of acquisition attempts made.
        attempts: u32,
        /// Outcome of the last attempt.
        last: String,
    },

    /// Release was attempted by an invocation that does not own the lock.
    #[error("lock is owned by {found:?}, not {expected:?}")]
    LockOwnershipMismatch {
        /// Owner that tried to release.
        expected: String,
        /// Owner recorded in the lock object.
        found: String,
    },

    /// A package archive or control stanza could not be parsed.
    #[error("failed to parse package {path}: {source}")]
    Parse {
        /// Object the package came from.
        path: String,
        /// Underlying parser error.
        #[source]
        source: apt_repository::AptRepositoryError,
    },

    /// An index or manifest could not be encoded.
    #[error("index format error: {0}")]
    Format(#[from] apt_repository::AptRepositoryError),

    /// An object that must exist is missing.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The blob store failed for a reason other than a missing object.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Signing the Release file failed.
    #[error("signing failed: {0}")]
    Sign(String),

    /// The invocation was cancelled or ran past its deadline.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O failed (scratch files, subprocess pipes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document (lock record, trigger event) was malformed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(path) => Error::NotFound(path),
            e => Error::Storage(e),
        }
    }
}

impl Error {
    /// Wrap a parser error with the object it was reading.
    pub fn parse<S: Into<String>>(path: S, source: apt_repository::AptRepositoryError) -> Self {
        Error::Parse {
            path: path.into(),
            source,
        }
    }
}

/// Result type for publisher operations.
pub type Result<T> = std::result::Result<T, Error>;
