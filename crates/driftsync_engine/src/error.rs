//! Sync cycle failures.

use driftsync_protocol::ProtocolError;
use driftsync_store::StoreError;
use thiserror::Error;

/// Result of a coordinator or transport call.
pub type SyncResult<T> = Result<T, SyncError>;

/// Why a sync phase failed.
///
/// Only failures in pull or merge fail the cycle itself; push-side problems
/// end up in [`SyncReport::push_error`](crate::SyncReport::push_error).
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never produced a response.
    #[error("transport failed: {message}")]
    Transport {
        /// What went wrong.
        message: String,
        /// Whether another attempt may succeed.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the error body.
        message: String,
    },

    /// A body could not be encoded or decoded.
    #[error("malformed message: {0}")]
    Protocol(String),

    /// The local replica refused a read or a transaction.
    #[error("local store: {0}")]
    Store(#[from] StoreError),

    /// The cancel token fired between phases.
    #[error("sync cancelled")]
    Cancelled,

    /// The HTTP client gave up waiting.
    #[error("request timed out")]
    Timeout,
}

impl SyncError {
    /// A transport failure worth retrying, e.g. a refused connection.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// A transport failure that will not go away, e.g. a bad URL.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether [`sync_with_retry`](crate::SyncCoordinator::sync_with_retry)
    /// should try again.
    ///
    /// 5xx answers are retried, 4xx answers are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid url").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!SyncError::Server {
            status: 400,
            message: "bad payload".into()
        }
        .is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Store(StoreError::WriteFailed("disk".into())).is_retryable());
    }

    #[test]
    fn messages() {
        let err = SyncError::Server {
            status: 500,
            message: "store unavailable".into(),
        };
        assert_eq!(err.to_string(), "server returned 500: store unavailable");
        assert_eq!(SyncError::Cancelled.to_string(), "sync cancelled");
    }
}
