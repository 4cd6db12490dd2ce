use std::{sync::Arc, time::Duration};

use linkrpc::{ErrorCode, ErrorShape};
use serde_json::Value;

/// Why an operation failed, as seen by the caller.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum ClientError {
    /// The server answered with an error envelope.
    #[error("{message}")]
    Server {
        code: ErrorCode,
        message: String,
        /// The envelope's `error.data`.
        data: Option<Value>,
    },
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
    #[error("error decoding response: {0}")]
    Decode(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("operation was cancelled")]
    Cancelled,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("link chain exhausted for '{0}', the last link must be a terminating link")]
    ChainExhausted(String),
    #[error("{0}")]
    Unsupported(String),
}

impl ClientError {
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Server { code, .. } => *code,
            Self::Transport(_) | Self::ConnectionClosed | Self::ChainExhausted(_) => {
                ErrorCode::InternalServerError
            }
            Self::Decode(_) => ErrorCode::ParseError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::ClientClosedRequest,
            Self::Unsupported(_) => ErrorCode::MethodNotSupported,
        }
    }

    /// The `path` of the procedure a server error came from, when the server included it.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Server {
                data: Some(data), ..
            } => data.get("path").and_then(Value::as_str),
            _ => None,
        }
    }
}

impl From<ErrorShape> for ClientError {
    fn from(shape: ErrorShape) -> Self {
        Self::Server {
            code: shape.data.code,
            message: shape.message,
            data: serde_json::to_value(shape.data).ok(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
