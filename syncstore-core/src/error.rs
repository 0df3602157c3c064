//! Error types for syncstore.

use thiserror::Error;

use crate::store::StoreError;

/// An operation builder was used in a way that can never succeed.
///
/// This is a programmer error, not a runtime condition of the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperationDescriptor {
    #[error("'{0}' was not set as value back reference")]
    NoBackReference(String),
}

/// Errors that can occur while committing a batch to the local store.
#[derive(Error, Debug)]
pub enum LocalStorageError {
    #[error(
        "Can't transfer data to store (operation {index} is too large and can't be split)"
    )]
    TooLargeUnsplittable {
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("Couldn't apply batch operation (operations {start}..{end})")]
    ApplyFailed {
        start: usize,
        end: usize,
        #[source]
        source: StoreError,
    },

    #[error("Store threw a runtime fault (operations {start}..{end})")]
    RuntimeFault {
        start: usize,
        end: usize,
        #[source]
        source: StoreError,
    },

    #[error("Referenced operation {referenced} didn't produce a valid result (needed by operation {index}, key '{key}')")]
    MissingReferenceResult {
        index: usize,
        key: String,
        referenced: usize,
    },

    #[error("Batch operation returned {actual} instead of {expected} results (operations {start}..{end})")]
    ResultCountMismatch {
        start: usize,
        end: usize,
        expected: usize,
        actual: usize,
    },
}

impl LocalStorageError {
    /// Wraps a store failure that is not a capacity problem.
    pub(crate) fn from_store(start: usize, end: usize, source: StoreError) -> Self {
        match source {
            StoreError::ApplyFailed(_) => LocalStorageError::ApplyFailed { start, end, source },
            _ => LocalStorageError::RuntimeFault { start, end, source },
        }
    }
}

/// Errors while loading or saving the storage configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown backend profile '{0}'")]
    UnknownProfile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for commit-level operations.
pub type StorageResult<T> = Result<T, LocalStorageError>;

/// Result type alias for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;
