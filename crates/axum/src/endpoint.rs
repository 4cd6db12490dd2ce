use std::{future::Future, sync::Arc};

use axum::{
    body::Body,
    extract::Request,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json,
};
use linkrpc::{
    http::{HttpHandler, HttpRequest},
    CorsOptions, Error, ErrorCode, RequestInfo, ResponseEnvelope, Router,
};

/// Construct a new [`axum::Router`] exposing a [`linkrpc::Router`].
pub struct Endpoint<TCtx> {
    router: Arc<Router<TCtx>>,
    cors: Option<CorsOptions>,
    max_body_size: Option<usize>,
    expose_stack: bool,
    websocket: bool,
}

impl<TCtx> Endpoint<TCtx>
where
    TCtx: Clone + Send + Sync + 'static,
{
    /// Construct a new [`axum::Router`] with every feature enabled.
    ///
    /// Procedures are served at `/<path>` and, with the `ws` feature, the socket at `/ws`. Use
    /// [`Endpoint::builder`] to configure them.
    pub fn new<S, F>(
        router: impl Into<Arc<Router<TCtx>>>,
        ctx_fn: impl Fn(RequestInfo) -> F + Send + Sync + 'static,
    ) -> axum::Router<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Future<Output = Result<TCtx, Error>> + Send + 'static,
    {
        #[allow(unused_mut)]
        let mut t = Self::builder(router);
        #[cfg(feature = "ws")]
        {
            t = t.with_websocket();
        }
        t.build(ctx_fn)
    }

    /// Construct a new [`Endpoint`] serving HTTP only.
    pub fn builder(router: impl Into<Arc<Router<TCtx>>>) -> Self {
        Self {
            router: router.into(),
            cors: None,
            max_body_size: None,
            expose_stack: false,
            websocket: false,
        }
    }

    pub fn with_cors(self, cors: CorsOptions) -> Self {
        Self {
            cors: Some(cors),
            ..self
        }
    }

    /// Reject request bodies larger than `bytes` with `PAYLOAD_TOO_LARGE`.
    pub fn with_max_body_size(self, bytes: usize) -> Self {
        Self {
            max_body_size: Some(bytes),
            ..self
        }
    }

    /// Include error cause chains in responses. Meant for development.
    pub fn with_stack(self, expose_stack: bool) -> Self {
        Self {
            expose_stack,
            ..self
        }
    }

    /// Exposes a WebSocket connection for queries, mutations and subscriptions at `/ws`.
    #[cfg(feature = "ws")]
    #[cfg_attr(docsrs, doc(cfg(feature = "ws")))]
    pub fn with_websocket(self) -> Self {
        Self {
            websocket: true,
            ..self
        }
    }

    /// Build an [`axum::Router`] with the configured features.
    ///
    /// `ctx_fn` runs once per HTTP request and once per WebSocket message.
    pub fn build<S, F>(
        self,
        ctx_fn: impl Fn(RequestInfo) -> F + Send + Sync + 'static,
    ) -> axum::Router<S>
    where
        S: Clone + Send + Sync + 'static,
        F: Future<Output = Result<TCtx, Error>> + Send + 'static,
    {
        let ctx_fn = Arc::new(ctx_fn);
        let mut r = axum::Router::new();

        #[cfg(feature = "ws")]
        if self.websocket {
            let ctx_fn = ctx_fn.clone();
            let handler = linkrpc::ws::WsHandler::new(self.router.clone(), move |info| ctx_fn(info))
                .expose_stack(self.expose_stack);
            r = r.route("/ws", crate::ws::route(handler));
        }
        #[cfg(not(feature = "ws"))]
        let _ = self.websocket;

        let mut handler = HttpHandler::new(self.router, move |info| ctx_fn(info))
            .expose_stack(self.expose_stack);
        if let Some(cors) = self.cors {
            handler = handler.cors(cors);
        }
        // One byte over the limit is enough for the handler to reject it.
        let read_limit = match self.max_body_size {
            Some(limit) => {
                handler = handler.max_body_size(limit);
                limit.saturating_add(1)
            }
            None => usize::MAX,
        };

        r.route(
            "/*path",
            any(move |req: Request| {
                let handler = handler.clone();
                async move { handle_http(handler, read_limit, req).await }
            }),
        )
    }
}

async fn handle_http<TCtx>(handler: HttpHandler<TCtx>, read_limit: usize, req: Request) -> Response
where
    TCtx: Clone + Send + 'static,
{
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, read_limit).await {
        Ok(body) => body,
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("failed to read request body: {_err}");
            let err = Error::new(
                ErrorCode::PayloadTooLarge,
                format!("request body exceeds {} bytes", read_limit.saturating_sub(1)),
            );
            let status = StatusCode::from_u16(err.code().to_status_code())
                .unwrap_or(StatusCode::PAYLOAD_TOO_LARGE);
            let path = parts.uri.path().trim_start_matches('/');
            return (status, Json(ResponseEnvelope::error(&err, Some(path), false))).into_response();
        }
    };

    let resp = handler
        .handle(HttpRequest {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(Into::into),
            headers: headers(&parts.headers),
            body: body.to_vec(),
        })
        .await;

    let mut builder = Response::builder().status(resp.status);
    for (name, value) in resp.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(resp.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub(crate) fn request_info(parts: &Parts) -> RequestInfo {
    RequestInfo {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(Into::into),
        headers: headers(&parts.headers),
    }
}

/// Headers that aren't valid UTF-8 are skipped.
fn headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
