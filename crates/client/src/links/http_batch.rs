use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::join_all;
use linkrpc::ProcedureKind;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    link::{cancellable, Link, LinkOutput, LinkResult, Next},
    ClientError, Fetch, Operation,
};

use super::http::{build_request, decode_envelope, parse_body, subscriptions_unsupported};

#[derive(Debug, Clone)]
pub struct HttpBatchLinkOptions {
    /// Split a flush into several requests of at most this many operations. Unlimited by default.
    pub max_batch_size: Option<usize>,
    /// Added to every request.
    pub headers: Vec<(String, String)>,
    /// How long the first queued operation waits for others before the batch is sent. Defaults
    /// to 2ms. Zero only yields to the scheduler once, which can split a batch on a
    /// multi-threaded runtime.
    pub batch_window: Duration,
}

impl Default for HttpBatchLinkOptions {
    fn default() -> Self {
        Self {
            max_batch_size: None,
            headers: Vec::new(),
            batch_window: Duration::from_millis(2),
        }
    }
}

struct Queued {
    op: Operation,
    tx: oneshot::Sender<LinkResult>,
}

struct Inner {
    url: String,
    fetch: Arc<dyn Fetch>,
    opts: HttpBatchLinkOptions,
    queue: Mutex<Vec<Queued>>,
}

/// Terminating link coalescing the operations issued within the same scheduler turn into one
/// batched HTTP request.
///
/// The flush runs on its own task once [`HttpBatchLinkOptions::batch_window`] has passed, so
/// operations queued by the caller on another worker thread still make it into the batch.
///
/// Each caller receives the envelope at its own index of the response array. If the request
/// itself fails every operation in it fails with the same error.
#[derive(Clone)]
pub struct HttpBatchLink {
    inner: Arc<Inner>,
}

impl HttpBatchLink {
    pub fn new(url: impl Into<String>, fetch: impl Fetch + 'static) -> Self {
        Self::with_options(url, fetch, HttpBatchLinkOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        fetch: impl Fetch + 'static,
        opts: HttpBatchLinkOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                fetch: Arc::new(fetch),
                opts,
                queue: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Link for HttpBatchLink {
    fn call(&self, op: Operation, _next: Next) -> LinkOutput {
        if op.kind == ProcedureKind::Subscription {
            return LinkOutput::Ready(Err(subscriptions_unsupported()));
        }

        let signal = op.signal.clone();
        let (tx, rx) = oneshot::channel();
        let first = {
            let mut queue = self.inner.queue.lock().unwrap_or_else(|err| err.into_inner());
            queue.push(Queued { op, tx });
            queue.len() == 1
        };

        if first {
            let inner = self.inner.clone();
            let window = inner.opts.batch_window;
            tokio::spawn(async move {
                if window.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(window).await;
                }
                inner.flush().await;
            });
        }

        LinkOutput::future(cancellable(signal, async move {
            rx.await.unwrap_or(Err(ClientError::ConnectionClosed))
        }))
    }
}

impl Inner {
    async fn flush(&self) {
        let queued = std::mem::take(&mut *self.queue.lock().unwrap_or_else(|err| err.into_inner()));
        let size = self.opts.max_batch_size.unwrap_or(usize::MAX).max(1);

        let mut queued = queued.into_iter().peekable();
        let mut chunks = Vec::new();
        while queued.peek().is_some() {
            chunks.push(queued.by_ref().take(size).collect::<Vec<_>>());
        }

        join_all(chunks.into_iter().map(|chunk| self.send(chunk))).await;
    }

    async fn send(&self, chunk: Vec<Queued>) {
        let (ops, txs): (Vec<_>, Vec<_>) = chunk.into_iter().map(|q| (q.op, q.tx)).unzip();
        let req = build_request(
            &self.url,
            &self.opts.headers,
            &ops.iter().collect::<Vec<_>>(),
            true,
        );

        tracing::trace!(len = ops.len(), method = req.method, "sending batch");

        match self.fetch.fetch(req).await.and_then(parse_body) {
            Ok(Value::Array(items)) => {
                let mut items = items.into_iter();
                for (i, tx) in txs.into_iter().enumerate() {
                    let result = match items.next() {
                        Some(item) => decode_envelope(item),
                        None => Err(ClientError::Decode(format!(
                            "batch response has no entry for index {i}"
                        ))),
                    };
                    let _ = tx.send(result);
                }
            }
            // A request level error, eg. an unparsable body, applies to every call.
            Ok(other) => {
                let result = decode_envelope(other);
                for tx in txs {
                    let _ = tx.send(result.clone());
                }
            }
            Err(err) => {
                for tx in txs {
                    let _ = tx.send(Err(err.clone()));
                }
            }
        }
    }
}
