use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, stream, FutureExt};
use linkrpc::Observable;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{ClientError, Operation};

pub type LinkResult = Result<Value, ClientError>;

/// What a link hands back for an operation.
pub enum LinkOutput {
    /// Already settled, eg. a cache hit.
    Ready(LinkResult),
    Future(BoxFuture<'static, LinkResult>),
    /// The values of a subscription.
    Observable(Observable<Value, ClientError>),
}

impl fmt::Debug for LinkOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Future(_) => f.write_str("Future"),
            Self::Observable(_) => f.write_str("Observable"),
        }
    }
}

impl LinkOutput {
    pub fn future(fut: impl Future<Output = LinkResult> + Send + 'static) -> Self {
        Self::Future(fut.boxed())
    }

    /// Wait for the single result of a query or mutation.
    pub async fn response(self) -> LinkResult {
        match self {
            Self::Ready(result) => result,
            Self::Future(fut) => fut.await,
            Self::Observable(_) => Err(ClientError::Unsupported(
                "expected a single response but the link returned a stream".into(),
            )),
        }
    }

    /// A single response becomes an observable emitting one value.
    pub fn into_observable(self) -> Observable<Value, ClientError> {
        match self {
            Self::Observable(obs) => obs,
            Self::Ready(result) => Observable::new(move |s| match result.clone() {
                Ok(value) => {
                    s.next(value);
                    s.complete();
                }
                Err(err) => s.error(err),
            }),
            Self::Future(fut) => Observable::from_stream(stream::once(fut)),
        }
    }
}

/// Intercepts an operation on its way to the transport.
///
/// A link either settles the operation itself (a terminating link such as
/// [`HttpLink`](crate::HttpLink)) or calls [`Next::run`], possibly with a modified operation, and
/// post-processes what comes back.
pub trait Link: Send + Sync {
    fn call(&self, op: Operation, next: Next) -> LinkOutput;
}

impl<F> Link for F
where
    F: Fn(Operation, Next) -> LinkOutput + Send + Sync,
{
    fn call(&self, op: Operation, next: Next) -> LinkOutput {
        self(op, next)
    }
}

pub(crate) type Links = Arc<[Arc<dyn Link>]>;

/// An ordered list of links. The last one should terminate the chain.
#[derive(Clone, Default)]
pub struct Chain(Vec<Arc<dyn Link>>);

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Chain").field(&self.0.len()).finish()
    }
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(mut self, link: impl Link + 'static) -> Self {
        self.0.push(Arc::new(link));
        self
    }

    pub(crate) fn into_links(self) -> Links {
        self.0.into()
    }
}

/// The rest of the chain after the current link.
#[derive(Clone)]
pub struct Next {
    links: Links,
    index: usize,
    parent: Option<Arc<Next>>,
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.links.len())
            .finish()
    }
}

impl Next {
    /// Pass the operation to the next link. Can be called many times, eg. to retry.
    pub fn run(&self, op: Operation) -> LinkOutput {
        if op.is_cancelled() {
            return LinkOutput::Ready(Err(ClientError::Cancelled));
        }

        match self.links.get(self.index) {
            Some(link) => link.call(
                op,
                Next {
                    links: self.links.clone(),
                    index: self.index + 1,
                    parent: self.parent.clone(),
                },
            ),
            None => match &self.parent {
                Some(parent) => parent.run(op),
                None => LinkOutput::Ready(Err(ClientError::ChainExhausted(op.path))),
            },
        }
    }

    /// Run `chain` as a sub-chain. When it runs out of links the operation continues after the
    /// current link.
    pub fn branch(&self, chain: Chain) -> Next {
        self.branch_links(chain.into_links())
    }

    pub(crate) fn branch_links(&self, links: Links) -> Next {
        Next {
            links,
            index: 0,
            parent: Some(Arc::new(self.clone())),
        }
    }
}

/// Send `op` through `chain` from the first link.
pub fn execute_link_chain(chain: &Chain, op: Operation) -> LinkOutput {
    run_links(chain.0.clone().into(), op)
}

pub(crate) fn run_links(links: Links, op: Operation) -> LinkOutput {
    Next {
        links,
        index: 0,
        parent: None,
    }
    .run(op)
}

/// Race `fut` against the operation's cancellation token.
pub(crate) async fn cancellable<T>(
    signal: Option<CancellationToken>,
    fut: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    match signal {
        Some(signal) => tokio::select! {
            _ = signal.cancelled() => Err(ClientError::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use linkrpc::ProcedureKind;
    use serde_json::json;

    use super::*;

    fn op(path: &str) -> Operation {
        Operation::new(1, ProcedureKind::Query, path, Value::Null)
    }

    #[tokio::test]
    async fn links_run_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (a, b) = (order.clone(), order.clone());
        let chain = Chain::new()
            .link(move |op: Operation, next: Next| {
                a.lock().unwrap().push("a");
                next.run(op.with_input(json!("patched")))
            })
            .link(move |op: Operation, _next: Next| {
                b.lock().unwrap().push("b");
                LinkOutput::Ready(Ok(op.input))
            });

        let result = execute_link_chain(&chain, op("x")).response().await;
        assert_eq!(result.unwrap(), json!("patched"));
        assert_eq!(*order.lock().unwrap(), ["a", "b"]);
    }

    #[tokio::test]
    async fn exhausted_chain() {
        let chain = Chain::new().link(|op: Operation, next: Next| next.run(op));
        let err = execute_link_chain(&chain, op("a.b")).response().await.unwrap_err();
        assert!(matches!(err, ClientError::ChainExhausted(path) if path == "a.b"));
    }

    #[tokio::test]
    async fn branch_falls_back_to_parent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub_chain = Chain::new().link(move |op: Operation, next: Next| {
            h.fetch_add(1, Ordering::SeqCst);
            next.run(op)
        });
        let chain = Chain::new()
            .link(move |op: Operation, next: Next| next.branch(sub_chain.clone()).run(op))
            .link(|_op: Operation, _next: Next| LinkOutput::Ready(Ok(json!("terminal"))));

        let result = execute_link_chain(&chain, op("x")).response().await;
        assert_eq!(result.unwrap(), json!("terminal"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_operations_never_reach_a_link() {
        let chain = Chain::new().link(|_op: Operation, _next: Next| -> LinkOutput {
            unreachable!("cancelled operation was forwarded")
        });
        let token = CancellationToken::new();
        token.cancel();

        let err = execute_link_chain(&chain, op("x").with_signal(token))
            .response()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }
}
