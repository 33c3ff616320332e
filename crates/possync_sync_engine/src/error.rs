//! Error types for the sync engine.

use possync_core::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors from the remote or from the engine around it.
///
/// Inside a pass these are absorbed: they show up only as a record's
/// `attempts` and in the pass summary. Refresh calls return them.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Remote answered with a non-success status.
    #[error("server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Payload could not be encoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Remote call exceeded the request timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Returns true if a later attempt could succeed without intervention.
    ///
    /// Queued records are retried regardless; this only shapes logging.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::server(503, "unavailable").is_retryable());
        assert!(SyncError::server(429, "slow down").is_retryable());
        assert!(!SyncError::server(400, "bad row").is_retryable());
        assert!(!SyncError::Protocol("bad json".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::Timeout.to_string(), "operation timed out");
        let err = SyncError::server(409, "duplicate key");
        assert!(err.to_string().contains("409"));
        assert!(err.to_string().contains("duplicate key"));
    }
}
