//! Error types for the local store and the typed layers built on it.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the local store, the pending-document queue, and the
/// reference cache.
///
/// Every variant threatens durability from the caller's point of view: an
/// `enqueue` that returns one of these has **not** preserved the document.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error (quota, medium unavailable, I/O).
    #[error("storage error: {0}")]
    Storage(#[from] possync_storage::StorageError),

    /// I/O error outside the backend (directory, manifest, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The named collection is not part of the opened schema.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// Name of the collection.
        name: String,
    },

    /// Stored schema cannot be used by this build.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A log frame or manifest failed validation.
    #[error("log corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Operation not permitted for this collection or record.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Another process holds the store directory lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates an unknown collection error.
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection { name: name.into() }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the underlying medium refused the write (quota
    /// exceeded, disabled by the host, I/O failure).
    pub fn is_medium_failure(&self) -> bool {
        match self {
            StoreError::Storage(e) => e.is_medium_failure(),
            StoreError::Io(_) | StoreError::Locked => true,
            _ => false,
        }
    }
}

impl<T: std::fmt::Debug> From<ciborium::ser::Error<T>> for StoreError {
    fn from(err: ciborium::ser::Error<T>) -> Self {
        StoreError::Codec(format!("encode: {err:?}"))
    }
}

impl<T: std::fmt::Debug> From<ciborium::de::Error<T>> for StoreError {
    fn from(err: ciborium::de::Error<T>) -> Self {
        StoreError::Codec(format!("decode: {err:?}"))
    }
}
