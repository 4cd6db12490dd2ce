//! The `{result}` / `{error}` wrapper for the outcome of a single call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, ErrorCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Result { result: ResultData },
    Error { error: ErrorShape },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub message: String,
    /// JSON-RPC numeric code, see [`ErrorCode::to_rpc_code`].
    pub code: i32,
    pub data: ErrorData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: ErrorCode,
    #[serde(rename = "httpStatus")]
    pub http_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorShape {
    pub fn new(err: &Error, path: Option<&str>, expose_stack: bool) -> Self {
        Self {
            message: err.message().to_string(),
            code: err.code().to_rpc_code(),
            data: ErrorData {
                code: err.code(),
                http_status: err.code().to_status_code(),
                path: path.map(ToString::to_string),
                stack: expose_stack.then(|| err.stack()),
            },
        }
    }
}

impl ResponseEnvelope {
    pub fn data(data: Value) -> Self {
        Self::Result {
            result: ResultData { data },
        }
    }

    pub fn error(err: &Error, path: Option<&str>, expose_stack: bool) -> Self {
        Self::Error {
            error: ErrorShape::new(err, path, expose_stack),
        }
    }

    pub fn from_result(
        result: Result<Value, Error>,
        path: Option<&str>,
        expose_stack: bool,
    ) -> Self {
        match result {
            Ok(data) => Self::data(data),
            Err(err) => Self::error(&err, path, expose_stack),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The HTTP status this envelope would be served with on its own.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Result { .. } => 200,
            Self::Error { error } => error.data.http_status,
        }
    }

    pub fn into_result(self) -> Result<Value, ErrorShape> {
        match self {
            Self::Result { result } => Ok(result.data),
            Self::Error { error } => Err(error),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn error_shape_on_the_wire() {
        let err = Error::new(ErrorCode::NotFound, "no procedure found at path 'a.b'");
        let env = ResponseEnvelope::error(&err, Some("a.b"), false);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "error": {
                    "message": "no procedure found at path 'a.b'",
                    "code": -32004,
                    "data": { "code": "NOT_FOUND", "httpStatus": 404, "path": "a.b" }
                }
            })
        );
        assert_eq!(env.http_status(), 404);
    }

    #[test]
    fn result_without_data_decodes_as_null() {
        let env: ResponseEnvelope = serde_json::from_value(json!({ "result": {} })).unwrap();
        assert_eq!(env, ResponseEnvelope::data(Value::Null));
    }
}
