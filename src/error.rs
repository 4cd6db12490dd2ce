use std::{borrow::Cow, error, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// An error returned from a procedure, middleware or transport adapter.
///
/// Every failure that reaches a transport adapter is one of these. Anything else thrown by a
/// resolver is coerced into an [`ErrorCode::InternalServerError`] with the original kept as the cause.
#[derive(Clone)]
pub struct Error {
    pub(crate) code: ErrorCode,
    pub(crate) message: String,
    pub(crate) cause: Option<Arc<dyn error::Error + Send + Sync>>, // `Arc` so the error stays `Clone` for batched and broadcast delivery.
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message
    }
}

impl Eq for Error {}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "linkrpc::Error {{ code: {:?}, message: {} }}",
            self.code, self.message
        )
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn error::Error + 'static))
    }
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause<TErr>(code: ErrorCode, message: impl Into<String>, cause: TErr) -> Self
    where
        TErr: error::Error + Send + Sync + 'static,
    {
        Self {
            code,
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Wrap an arbitrary error as [`ErrorCode::InternalServerError`], keeping it as the cause.
    pub fn internal<TErr>(cause: TErr) -> Self
    where
        TErr: error::Error + Send + Sync + 'static,
    {
        Self {
            code: ErrorCode::InternalServerError,
            message: cause.to_string(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Arc<dyn error::Error + Send + Sync>> {
        self.cause.as_ref()
    }

    /// Render the error and its cause chain, one per line.
    pub fn stack(&self) -> String {
        let mut out = self.to_string();
        let mut source = error::Error::source(self);
        while let Some(err) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::new(code, code.as_str())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal(err)
    }
}

impl From<Box<dyn error::Error + Send + Sync>> for Error {
    fn from(err: Box<dyn error::Error + Send + Sync>) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(err) => Self {
                code: ErrorCode::InternalServerError,
                message: err.to_string(),
                cause: Some(Arc::from(err)),
            },
        }
    }
}

/// The fixed set of error codes understood by both ends of the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
    InternalServerError,
    NotImplemented,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 15] = [
        ErrorCode::ParseError,
        ErrorCode::BadRequest,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::MethodNotSupported,
        ErrorCode::Timeout,
        ErrorCode::Conflict,
        ErrorCode::PreconditionFailed,
        ErrorCode::PayloadTooLarge,
        ErrorCode::UnprocessableContent,
        ErrorCode::TooManyRequests,
        ErrorCode::ClientClosedRequest,
        ErrorCode::InternalServerError,
        ErrorCode::NotImplemented,
    ];

    pub const fn to_status_code(&self) -> u16 {
        match self {
            ErrorCode::ParseError | ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::Timeout => 408,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::UnprocessableContent => 422,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::ClientClosedRequest => 499,
            ErrorCode::InternalServerError => 500,
            ErrorCode::NotImplemented => 501,
        }
    }

    /// `400` is ambiguous, it resolves to [`ErrorCode::BadRequest`].
    pub const fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            400 => Some(ErrorCode::BadRequest),
            401 => Some(ErrorCode::Unauthorized),
            403 => Some(ErrorCode::Forbidden),
            404 => Some(ErrorCode::NotFound),
            405 => Some(ErrorCode::MethodNotSupported),
            408 => Some(ErrorCode::Timeout),
            409 => Some(ErrorCode::Conflict),
            412 => Some(ErrorCode::PreconditionFailed),
            413 => Some(ErrorCode::PayloadTooLarge),
            422 => Some(ErrorCode::UnprocessableContent),
            429 => Some(ErrorCode::TooManyRequests),
            499 => Some(ErrorCode::ClientClosedRequest),
            500 => Some(ErrorCode::InternalServerError),
            501 => Some(ErrorCode::NotImplemented),
            _ => None,
        }
    }

    /// The JSON-RPC style numeric code carried in the error envelope.
    pub const fn to_rpc_code(&self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::BadRequest => -32600,
            ErrorCode::InternalServerError => -32603,
            ErrorCode::NotImplemented => -32603,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::Forbidden => -32003,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::Timeout => -32008,
            ErrorCode::Conflict => -32009,
            ErrorCode::PreconditionFailed => -32012,
            ErrorCode::PayloadTooLarge => -32013,
            ErrorCode::UnprocessableContent => -32022,
            ErrorCode::TooManyRequests => -32029,
            ErrorCode::ClientClosedRequest => -32099,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// TODO: Carry the procedure path on every variant so adapters don't have to thread it separately.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub(crate) enum ExecError {
    #[error("no procedure found at path '{0}'")]
    ProcedureNotFound(String),
    #[error("'{method}' is not supported for {kind} procedures")]
    MethodNotSupported {
        method: Cow<'static, str>,
        kind: crate::ProcedureKind,
    },
    #[error("HTTP method '{0}' is not supported")]
    UnsupportedHttpMethod(String),
    #[error("input validation failed")]
    InvalidInput(#[source] Box<dyn error::Error + Send + Sync>),
    #[error("output validation failed")]
    InvalidOutput(#[source] Box<dyn error::Error + Send + Sync>),
    #[error("error serializing procedure result")]
    Serialize(#[source] serde_json::Error),
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),
    #[error("malformed message: {0}")]
    InvalidFrame(#[source] serde_json::Error),
    #[error("subscriptions require a non-null id")]
    SubscriptionWithNullId,
    #[error("procedure panicked")]
    Panicked,
    #[error("subscription with id {0} already exists on this connection")]
    DuplicateSubscriptionId(String),
    #[error("request body exceeds the configured limit of {0} bytes")]
    PayloadTooLarge(usize),
}

impl From<ExecError> for Error {
    fn from(v: ExecError) -> Self {
        let message = v.to_string();
        match v {
            ExecError::ProcedureNotFound(_) => Error::new(ErrorCode::NotFound, message),
            ExecError::MethodNotSupported { .. } => {
                Error::new(ErrorCode::MethodNotSupported, message)
            }
            ExecError::UnsupportedHttpMethod(_) => {
                Error::new(ErrorCode::MethodNotSupported, message)
            }
            ExecError::InvalidInput(err) => Error {
                code: ErrorCode::BadRequest,
                message: err.to_string(),
                cause: Some(Arc::from(err)),
            },
            ExecError::InvalidOutput(err) => Error {
                code: ErrorCode::InternalServerError,
                message: err.to_string(),
                cause: Some(Arc::from(err)),
            },
            ExecError::Serialize(err) => {
                Error::with_cause(ErrorCode::InternalServerError, message, err)
            }
            ExecError::InvalidJson(err) => Error::with_cause(ErrorCode::ParseError, message, err),
            ExecError::Panicked => Error::new(ErrorCode::InternalServerError, message),
            ExecError::InvalidFrame(err) => Error::with_cause(ErrorCode::BadRequest, message, err),
            ExecError::SubscriptionWithNullId | ExecError::DuplicateSubscriptionId(_) => {
                Error::new(ErrorCode::BadRequest, message)
            }
            ExecError::PayloadTooLarge(_) => Error::new(ErrorCode::PayloadTooLarge, message),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in ErrorCode::ALL {
            let status = code.to_status_code();
            match code {
                ErrorCode::ParseError => {
                    assert_eq!(ErrorCode::from_status_code(status), Some(ErrorCode::BadRequest))
                }
                _ => assert_eq!(ErrorCode::from_status_code(status), Some(code)),
            }
        }
        assert_eq!(ErrorCode::from_status_code(418), None);
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        for code in ErrorCode::ALL {
            let value = serde_json::to_value(code).unwrap();
            assert_eq!(value, serde_json::Value::String(code.as_str().into()));
        }
    }

    #[test]
    fn internal_keeps_cause() {
        let err = Error::internal(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
        assert_eq!(err.code(), ErrorCode::InternalServerError);
        assert_eq!(err.message(), "disk on fire");
        assert!(error::Error::source(&err).is_some());
        assert!(err.stack().contains("caused by: disk on fire"));
    }

    #[test]
    fn boxed_typed_error_is_not_rewrapped() {
        let boxed: Box<dyn error::Error + Send + Sync> =
            Box::new(Error::new(ErrorCode::Forbidden, "nope"));
        let err: Error = boxed.into();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.message(), "nope");
    }
}
