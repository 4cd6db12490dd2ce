//! Frames exchanged over a WebSocket connection.
//!
//! Client to server: `{id, method, params: {path, input}}`.
//! Server to client: `{id, result: {type: "data", data} | {type: "stopped"}}` or `{id, error}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{envelope::ErrorShape, ProcedureKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Null,
    Number(u64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "query")]
    Query,
    #[serde(rename = "mutation")]
    Mutation,
    #[serde(rename = "subscription")]
    Subscription,
    #[serde(rename = "subscription.stop")]
    SubscriptionStop,
}

impl Method {
    /// The procedure kind this method calls, `None` for `subscription.stop`.
    pub fn kind(&self) -> Option<ProcedureKind> {
        match self {
            Self::Query => Some(ProcedureKind::Query),
            Self::Mutation => Some(ProcedureKind::Mutation),
            Self::Subscription => Some(ProcedureKind::Subscription),
            Self::SubscriptionStop => None,
        }
    }
}

impl From<ProcedureKind> for Method {
    fn from(kind: ProcedureKind) -> Self {
        match kind {
            ProcedureKind::Query => Self::Query,
            ProcedureKind::Mutation => Self::Mutation,
            ProcedureKind::Subscription => Self::Subscription,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub path: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResponseResult {
    Data {
        #[serde(default)]
        data: Value,
    },
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Result {
        id: RequestId,
        result: ResponseResult,
    },
    Error {
        id: RequestId,
        error: ErrorShape,
    },
}

impl Response {
    pub fn id(&self) -> &RequestId {
        match self {
            Self::Result { id, .. } | Self::Error { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn stop_frame_without_params() {
        let req: Request =
            serde_json::from_value(json!({ "id": 7, "method": "subscription.stop" })).unwrap();
        assert_eq!(req.id, RequestId::Number(7));
        assert_eq!(req.method, Method::SubscriptionStop);
        assert_eq!(req.params, None);
    }

    #[test]
    fn response_frames() {
        let data = Response::Result {
            id: RequestId::String("a".into()),
            result: ResponseResult::Data { data: json!(1) },
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({ "id": "a", "result": { "type": "data", "data": 1 } })
        );

        let stopped: Response =
            serde_json::from_value(json!({ "id": null, "result": { "type": "stopped" } })).unwrap();
        assert_eq!(
            stopped,
            Response::Result {
                id: RequestId::Null,
                result: ResponseResult::Stopped
            }
        );
    }
}
