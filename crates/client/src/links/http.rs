use std::sync::Arc;

use linkrpc::{ProcedureKind, ResponseEnvelope};
use serde_json::Value;

use crate::{
    link::{cancellable, Link, LinkOutput, LinkResult, Next},
    ClientError, Fetch, FetchRequest, FetchResponse, Operation,
};

/// Terminating link sending one HTTP request per operation.
///
/// Queries are sent as `GET <url>/<path>?batch=false&input=<json>`, mutations are `POST`ed with
/// the input as the body. Subscriptions aren't supported over HTTP, route them to a
/// [`WsLink`](crate::WsLink) with a [`SplitLink`](crate::SplitLink).
pub struct HttpLink {
    url: String,
    fetch: Arc<dyn Fetch>,
    headers: Vec<(String, String)>,
}

impl HttpLink {
    pub fn new(url: impl Into<String>, fetch: impl Fetch + 'static) -> Self {
        Self {
            url: url.into(),
            fetch: Arc::new(fetch),
            headers: Vec::new(),
        }
    }

    /// Add a header to every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl Link for HttpLink {
    fn call(&self, op: Operation, _next: Next) -> LinkOutput {
        if op.kind == ProcedureKind::Subscription {
            return LinkOutput::Ready(Err(subscriptions_unsupported()));
        }

        let req = build_request(&self.url, &self.headers, &[&op], false);
        let fetch = self.fetch.clone();
        LinkOutput::future(cancellable(op.signal, async move {
            let resp = fetch.fetch(req).await?;
            decode_envelope(parse_body(resp)?)
        }))
    }
}

pub(crate) fn subscriptions_unsupported() -> ClientError {
    ClientError::Unsupported("subscriptions are not supported over HTTP".into())
}

/// Requests with any mutation in them are `POST`ed, everything else uses `GET`.
pub(crate) fn build_request(
    base: &str,
    headers: &[(String, String)],
    ops: &[&Operation],
    batch: bool,
) -> FetchRequest {
    let paths = ops
        .iter()
        .map(|op| op.path.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let input = if batch {
        Value::Array(ops.iter().map(|op| op.input.clone()).collect())
    } else {
        ops.first().map(|op| op.input.clone()).unwrap_or_default()
    };
    let post = ops.iter().any(|op| op.kind == ProcedureKind::Mutation);

    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("batch", if batch { "true" } else { "false" });
    if !post {
        query.append_pair("input", &input.to_string());
    }

    let mut headers = headers.to_vec();
    headers.push(("Content-Type".into(), "application/json".into()));

    FetchRequest {
        method: if post { "POST" } else { "GET" },
        url: format!(
            "{}/{}?{}",
            base.trim_end_matches('/'),
            paths,
            query.finish()
        ),
        headers,
        body: post.then(|| input.to_string().into_bytes()),
    }
}

pub(crate) fn parse_body(resp: FetchResponse) -> Result<Value, ClientError> {
    serde_json::from_slice(&resp.body).map_err(|err| {
        ClientError::Decode(format!("invalid JSON in HTTP {} response: {err}", resp.status))
    })
}

pub(crate) fn decode_envelope(value: Value) -> LinkResult {
    let envelope: ResponseEnvelope = serde_json::from_value(value)?;
    envelope.into_result().map_err(ClientError::from)
}
