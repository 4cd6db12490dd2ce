//! Framework-agnostic HTTP adapter.
//!
//! `GET|POST <endpoint>/<path>[,<path>...]?batch=true|false[&input=<json>]`. A batched request
//! carries a JSON array of inputs index-aligned with the comma-joined paths and always responds
//! with `200` and an array of envelopes. A single request responds with the envelope and the
//! status mapped from its error code.

use std::{future::Future, sync::Arc};

use futures::future::join_all;
use serde_json::Value;

use crate::{
    cors::CorsOptions,
    dispatch::call_procedure,
    envelope::ResponseEnvelope,
    error::ExecError,
    request::{context_fn, header, ContextFn, RequestInfo},
    Error, ProcedureKind, ProcedureOutput, Router,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    /// The raw query string without the leading `?`.
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }

    /// The body decoded as JSON. `None` for empty or non-JSON bodies.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// The outcome of dispatching one HTTP call, before it's encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResponse {
    pub status: u16,
    pub body: Value,
}

pub struct HttpHandler<TCtx> {
    router: Arc<Router<TCtx>>,
    ctx_fn: ContextFn<TCtx>,
    endpoint: Option<String>,
    cors: Option<CorsOptions>,
    max_body_size: Option<usize>,
    expose_stack: bool,
}

impl<TCtx> Clone for HttpHandler<TCtx> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            ctx_fn: self.ctx_fn.clone(),
            endpoint: self.endpoint.clone(),
            cors: self.cors.clone(),
            max_body_size: self.max_body_size,
            expose_stack: self.expose_stack,
        }
    }
}

impl<TCtx> HttpHandler<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    /// `ctx_fn` runs once per HTTP request, every call in a batch gets a clone of its result.
    pub fn new<F>(
        router: impl Into<Arc<Router<TCtx>>>,
        ctx_fn: impl Fn(RequestInfo) -> F + Send + Sync + 'static,
    ) -> Self
    where
        F: Future<Output = Result<TCtx, Error>> + Send + 'static,
    {
        Self {
            router: router.into(),
            ctx_fn: context_fn(ctx_fn),
            endpoint: None,
            cors: None,
            max_body_size: None,
            expose_stack: false,
        }
    }

    /// Base path stripped from the request path before it's resolved, eg. `/rpc`.
    pub fn endpoint(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint = Some(prefix.into());
        self
    }

    pub fn cors(mut self, cors: CorsOptions) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Bodies larger than `bytes` are rejected with `PAYLOAD_TOO_LARGE`.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = Some(bytes);
        self
    }

    /// Include the error's cause chain in `error.data.stack`. Meant for development.
    pub fn expose_stack(mut self, expose: bool) -> Self {
        self.expose_stack = expose;
        self
    }

    pub fn router(&self) -> &Arc<Router<TCtx>> {
        &self.router
    }

    pub async fn handle(&self, req: HttpRequest) -> HttpResponse {
        let preflight = req.method.eq_ignore_ascii_case("OPTIONS");
        let mut headers = self
            .cors
            .as_ref()
            .map(|cors| {
                cors.headers(
                    header(&req.headers, "origin"),
                    header(&req.headers, "access-control-request-headers"),
                    preflight,
                )
            })
            .unwrap_or_default();

        if preflight && self.cors.is_some() {
            return HttpResponse {
                status: 204,
                headers,
                body: Vec::new(),
            };
        }

        let resolved = self.resolve(req).await;
        headers.push(("Content-Type".into(), "application/json".into()));
        HttpResponse {
            status: resolved.status,
            headers,
            // Serializing a `Value` can't fail.
            body: serde_json::to_vec(&resolved.body).unwrap_or_default(),
        }
    }

    async fn resolve(&self, req: HttpRequest) -> ResolvedResponse {
        let path = self.strip_endpoint(&req.path).to_string();
        let info = req.info();
        let query = req.query.as_deref().unwrap_or_default();
        let is_batch = query_param(query, "batch").as_deref() == Some("true");

        let input = match self.read_input(&req, query) {
            Ok(input) => input,
            Err(err) => return self.request_error(&err, &path),
        };

        let ctx = match (self.ctx_fn)(info).await {
            Ok(ctx) => ctx,
            Err(err) => return self.request_error(&err, &path),
        };

        resolve_http_response(
            &self.router,
            &req.method,
            &path,
            ctx,
            input,
            is_batch,
            self.expose_stack,
        )
        .await
    }

    fn read_input(&self, req: &HttpRequest, query: &str) -> Result<Value, Error> {
        if req.method.eq_ignore_ascii_case("GET") {
            return match query_param(query, "input") {
                Some(input) => serde_json::from_str(&input)
                    .map_err(|err| ExecError::InvalidJson(err).into()),
                None => Ok(Value::Null),
            };
        }

        if req.method.eq_ignore_ascii_case("POST") {
            if let Some(limit) = self.max_body_size {
                if req.body.len() > limit {
                    return Err(ExecError::PayloadTooLarge(limit).into());
                }
            }
            if req.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&req.body)
                .map_err(|err| ExecError::InvalidJson(err).into());
        }

        Err(ExecError::UnsupportedHttpMethod(req.method.clone()).into())
    }

    fn strip_endpoint<'a>(&self, path: &'a str) -> &'a str {
        let path = match &self.endpoint {
            Some(prefix) => path.strip_prefix(prefix.as_str()).unwrap_or(path),
            None => path,
        };
        path.trim_start_matches('/')
    }

    fn request_error(&self, err: &Error, path: &str) -> ResolvedResponse {
        ResolvedResponse {
            status: err.code().to_status_code(),
            body: envelope_value(ResponseEnvelope::error(
                err,
                Some(path),
                self.expose_stack,
            )),
        }
    }
}

fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find_map(|(key, value)| (key == name).then(|| value.into_owned()))
}

fn envelope_value(envelope: ResponseEnvelope) -> Value {
    serde_json::to_value(envelope).unwrap_or(Value::Null)
}

/// Dispatch every path of a (possibly batched) request concurrently and collect the envelopes
/// in request order.
pub async fn resolve_http_response<TCtx>(
    router: &Router<TCtx>,
    method: &str,
    path: &str,
    ctx: TCtx,
    input: Value,
    is_batch: bool,
    expose_stack: bool,
) -> ResolvedResponse
where
    TCtx: Clone + Send + 'static,
{
    let paths: Vec<&str> = if is_batch {
        path.split(',').collect()
    } else {
        vec![path]
    };
    let mut inputs = match input {
        Value::Array(inputs) if is_batch => inputs,
        input => vec![input],
    };
    inputs.resize(paths.len(), Value::Null);

    let method = method.to_ascii_uppercase();
    let transformer = router.get_transformer();
    let calls = paths.iter().copied().zip(inputs).map(|(path, input)| {
        let input = match transformer {
            Some(t) => t.input().deserialize(input),
            None => input,
        };
        let ctx = ctx.clone();
        let method = method.as_str();
        async move {
            let result = match router.resolve(path) {
                Ok(procedure) => {
                    let kind = procedure.kind();
                    let allowed = match method {
                        "GET" => kind == ProcedureKind::Query,
                        "POST" => kind != ProcedureKind::Subscription,
                        _ => false,
                    };
                    if allowed {
                        call_procedure(procedure, ctx, input, path, kind).await
                    } else {
                        Err(ExecError::MethodNotSupported {
                            method: method.to_string().into(),
                            kind,
                        }
                        .into())
                    }
                }
                Err(err) => Err(err),
            };

            let result = result.and_then(|output| match output {
                ProcedureOutput::Value(v) => Ok(match transformer {
                    Some(t) => t.output().serialize(v),
                    None => v,
                }),
                ProcedureOutput::Subscription(_) => Err(ExecError::MethodNotSupported {
                    method: method.to_string().into(),
                    kind: ProcedureKind::Subscription,
                }
                .into()),
            });

            ResponseEnvelope::from_result(result, Some(path), expose_stack)
        }
    });
    let envelopes = join_all(calls).await;

    if is_batch {
        ResolvedResponse {
            status: 200,
            body: Value::Array(envelopes.into_iter().map(envelope_value).collect()),
        }
    } else {
        let envelope = envelopes
            .into_iter()
            .next()
            .unwrap_or_else(|| ResponseEnvelope::data(Value::Null));
        ResolvedResponse {
            status: envelope.http_status(),
            body: envelope_value(envelope),
        }
    }
}
