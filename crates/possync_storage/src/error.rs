//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The write would exceed the medium's byte quota.
    #[error("storage quota exceeded: {requested} bytes requested, limit {limit}")]
    QuotaExceeded {
        /// Total size the write would have produced.
        requested: u64,
        /// The configured quota.
        limit: u64,
    },

    /// The host has disabled or revoked the storage medium.
    #[error("storage medium unavailable")]
    Unavailable,
}

impl StorageError {
    /// Returns true if the failure is caused by the medium itself rather than
    /// by the caller (quota, revoked access, I/O).
    pub fn is_medium_failure(&self) -> bool {
        !matches!(self, StorageError::ReadPastEnd { .. })
    }
}
