#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future::BoxFuture;
use linkrpc::{
    http::{HttpHandler, HttpRequest},
    ws::WsHandler,
    Error, ErrorCode, Observable, Procedure, RequestInfo, Router,
};
use linkrpc_client::{ClientError, Fetch, FetchRequest, FetchResponse};
use serde::Deserialize;
use serde_json::{json, Value};

pub const BASE: &str = "http://linkrpc.test/rpc";

#[derive(Deserialize)]
struct Greet {
    name: String,
}

/// Procedures shared by the client tests.
///
/// `flaky` fails while `failures_left` is above zero.
pub fn router(failures_left: Arc<AtomicUsize>) -> Router<()> {
    Router::new()
        .procedure(
            "greet",
            Procedure::builder().query(|_, input: Greet| async move {
                Ok::<_, Error>(json!({ "message": format!("Hello {}", input.name) }))
            }),
        )
        .procedure(
            "echo",
            Procedure::builder().mutation(|_, input: Value| async move { Ok::<_, Error>(input) }),
        )
        .procedure(
            "forbidden",
            Procedure::builder().query(|_, _: ()| async {
                Err::<(), _>(Error::new(ErrorCode::Forbidden, "nope"))
            }),
        )
        .procedure(
            "slow",
            Procedure::builder().query(|_, ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, Error>(ms)
            }),
        )
        .procedure(
            "flaky",
            Procedure::builder().query(move |_, _: ()| {
                let failures_left = failures_left.clone();
                async move {
                    let failing = failures_left
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok();
                    if failing {
                        Err(Error::new(ErrorCode::InternalServerError, "try again"))
                    } else {
                        Ok("ok")
                    }
                }
            }),
        )
        .procedure(
            "countdown",
            Procedure::builder().subscription(|_, from: u32| async move {
                Ok::<_, Error>(Observable::new(move |s| {
                    for i in (1..=from).rev() {
                        s.next(i);
                    }
                    s.complete();
                }))
            }),
        )
        .procedure(
            "ticks",
            Procedure::builder().subscription(|_, _: ()| async {
                Ok::<_, Error>(Observable::from_stream(async_stream::stream! {
                    let mut i = 0u32;
                    loop {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        i += 1;
                        yield Ok(i);
                    }
                }))
            }),
        )
}

/// An in-process server reached through [`Fetch`].
#[derive(Clone)]
pub struct Server {
    pub handler: HttpHandler<()>,
    pub ws: WsHandler<()>,
    /// HTTP requests received so far.
    pub requests: Arc<AtomicUsize>,
    pub failures_left: Arc<AtomicUsize>,
}

impl Server {
    pub fn new() -> Self {
        let failures_left = Arc::new(AtomicUsize::new(0));
        let router = Arc::new(router(failures_left.clone()));
        Self {
            handler: HttpHandler::new(router.clone(), |_: RequestInfo| async {
                Ok::<_, Error>(())
            })
            .endpoint("/rpc"),
            ws: WsHandler::new(router, |_: RequestInfo| async { Ok::<_, Error>(()) }),
            requests: Arc::new(AtomicUsize::new(0)),
            failures_left,
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn fetch(&self) -> impl Fetch + Clone {
        let (handler, requests) = (self.handler.clone(), self.requests.clone());
        move |req: FetchRequest| -> BoxFuture<'static, Result<FetchResponse, ClientError>> {
            requests.fetch_add(1, Ordering::SeqCst);
            let handler = handler.clone();
            Box::pin(async move {
                let url = req.url.strip_prefix("http://linkrpc.test").unwrap_or(&req.url);
                let (path, query) = match url.split_once('?') {
                    Some((path, query)) => (path.to_string(), Some(query.to_string())),
                    None => (url.to_string(), None),
                };

                let resp = handler
                    .handle(HttpRequest {
                        method: req.method.into(),
                        path,
                        query,
                        headers: req.headers,
                        body: req.body.unwrap_or_default(),
                    })
                    .await;
                Ok(FetchResponse {
                    status: resp.status,
                    body: resp.body,
                })
            })
        }
    }
}
