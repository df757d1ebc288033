use dbrelay_core::ErrorCode;
use serde_json::Value as JsonValue;

/// Client-side error (§4.7). `Rpc` wraps an error the server actually sent
/// back; the others are connection/protocol failures that never reached a
/// dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("{message}")]
    Rpc {
        code: ErrorCode,
        message: String,
        data: Option<JsonValue>,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Connection-level failures are the only ones worth retrying (§4.7):
    /// an `Rpc` error means the server ran the request and rejected it, and
    /// retrying would just repeat the same rejection (or double-apply a
    /// write).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Connection(_) | ClientError::Timeout | ClientError::Io(_))
    }
}
