//! Request failures and their HTTP status codes.

use driftsync_protocol::ProtocolError;
use driftsync_store::StoreError;
use thiserror::Error;

/// Result of a reconciler or router call.
pub type ServerResult<T> = Result<T, ServerError>;

/// Why a request was not served.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The body is not a well-formed pull or push request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Push batch exceeds the configured limit.
    #[error("batch too large: {size} > {max}")]
    BatchTooLarge {
        /// Items in the request.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// No such route or table.
    #[error("not found: {0}")]
    NotFound(String),

    /// The canonical store refused a read or a batch.
    #[error("server store: {0}")]
    Store(#[from] StoreError),

    /// A response could not be encoded.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The caller sent something wrong (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::BatchTooLarge { .. }
                | ServerError::NotFound(_)
        )
    }

    /// The server failed (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Store(_) | ServerError::Internal(_))
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::NotFound(_) => 404,
            ServerError::InvalidRequest(_) | ServerError::BatchTooLarge { .. } => 400,
            ServerError::Store(_) | ServerError::Internal(_) => 500,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}
