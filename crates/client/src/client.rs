use std::{
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use linkrpc::{CombinedTransformer, Observable, Observer, ProcedureKind, Subscriber};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::{
    link::{run_links, Links},
    Chain, ClientError, Operation,
};

/// A procedure known at compile time. Usually generated alongside the router.
///
/// ```rust
/// # use linkrpc::ProcedureKind;
/// # use linkrpc_client::Procedure;
/// pub struct Procedures;
///
/// pub struct Greet;
///
/// impl Procedure for Greet {
///     type Input = String;
///     type Output = String;
///     type Procedures = Procedures;
///
///     const KEY: &'static str = "greet";
///     const KIND: ProcedureKind = ProcedureKind::Query;
/// }
/// ```
pub trait Procedure {
    type Input: Serialize;
    type Output: DeserializeOwned;
    /// The set of procedures this one belongs to, ties it to a [`Client<P>`].
    type Procedures;

    const KEY: &'static str;
    const KIND: ProcedureKind;
}

/// Sends operations through a link chain.
///
/// `P` optionally ties the client to a set of [`Procedure`]s for [`Client::exec`]. The
/// string-keyed methods work for any `P`.
pub struct Client<P = ()> {
    links: Links,
    next_id: Arc<AtomicU64>,
    transformer: Option<CombinedTransformer>,
    phantom: PhantomData<fn() -> P>,
}

impl<P> Clone for Client<P> {
    fn clone(&self) -> Self {
        Self {
            links: self.links.clone(),
            next_id: self.next_id.clone(),
            transformer: self.transformer.clone(),
            phantom: PhantomData,
        }
    }
}

impl<P> fmt::Debug for Client<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("links", &self.links.len())
            .field("transformer", &self.transformer)
            .finish()
    }
}

impl<P> Client<P> {
    pub fn new(chain: Chain) -> Self {
        Self {
            links: chain.into_links(),
            next_id: Arc::new(AtomicU64::new(1)),
            transformer: None,
            phantom: PhantomData,
        }
    }

    /// Must match the transformer configured on the server's router.
    pub fn transformer(mut self, transformer: CombinedTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub async fn query<O: DeserializeOwned>(
        &self,
        path: &str,
        input: impl Serialize,
    ) -> Result<O, ClientError> {
        self.operation(ProcedureKind::Query, path, input)
            .send()
            .await
    }

    pub async fn mutation<O: DeserializeOwned>(
        &self,
        path: &str,
        input: impl Serialize,
    ) -> Result<O, ClientError> {
        self.operation(ProcedureKind::Mutation, path, input)
            .send()
            .await
    }

    /// Nothing is sent until the observable is subscribed to. Every subscription is a separate
    /// operation.
    pub fn subscription<O>(&self, path: &str, input: impl Serialize) -> Observable<O, ClientError>
    where
        O: DeserializeOwned + Send + 'static,
        P: 'static,
    {
        self.operation(ProcedureKind::Subscription, path, input)
            .subscribe()
    }

    /// Call a query or mutation through its typed descriptor.
    pub async fn exec<O: Procedure<Procedures = P>>(
        &self,
        input: O::Input,
    ) -> Result<O::Output, ClientError> {
        self.operation(O::KIND, O::KEY, input).send().await
    }

    /// Build an operation with a cancellation token or link context.
    pub fn operation(
        &self,
        kind: ProcedureKind,
        path: impl Into<String>,
        input: impl Serialize,
    ) -> OperationBuilder<'_, P> {
        OperationBuilder {
            client: self,
            kind,
            path: path.into(),
            input: serde_json::to_value(input).map_err(ClientError::from),
            context: Map::new(),
            signal: None,
        }
    }

    fn encode_input(&self, input: Value) -> Value {
        match &self.transformer {
            Some(t) => t.input().serialize(input),
            None => input,
        }
    }
}

/// See [`Client::operation`].
#[must_use = "an operation does nothing until it's sent or subscribed to"]
pub struct OperationBuilder<'a, P> {
    client: &'a Client<P>,
    kind: ProcedureKind,
    path: String,
    input: Result<Value, ClientError>,
    context: Map<String, Value>,
    signal: Option<CancellationToken>,
}

impl<P> OperationBuilder<'_, P> {
    /// Cancelling the token fails the operation with [`ClientError::Cancelled`].
    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub async fn send<O: DeserializeOwned>(self) -> Result<O, ClientError> {
        let client = self.client;
        let transformer = client.transformer.clone();
        let op = self.build()?;

        tracing::trace!(id = op.id, kind = %op.kind, path = op.path, "sending operation");
        let data = run_links(client.links.clone(), op).response().await?;
        decode(&transformer, data)
    }

    pub fn subscribe<O>(self) -> Observable<O, ClientError>
    where
        O: DeserializeOwned + Send + 'static,
        P: 'static,
    {
        let client = self.client.clone();
        let (kind, path, input, context, signal) =
            (self.kind, self.path, self.input, self.context, self.signal);

        Observable::new(move |subscriber: Subscriber<O, ClientError>| {
            let input = match input.clone() {
                Ok(input) => client.encode_input(input),
                Err(err) => {
                    subscriber.error(err);
                    return None;
                }
            };
            let op = Operation {
                id: client.next_id.fetch_add(1, Ordering::Relaxed),
                kind,
                path: path.clone(),
                input,
                context: context.clone(),
                signal: signal.clone(),
            };

            let transformer = client.transformer.clone();
            let (on_next, on_error, on_complete) =
                (subscriber.clone(), subscriber.clone(), subscriber);
            let sub = run_links(client.links.clone(), op)
                .into_observable()
                .subscribe(
                    Observer::new()
                        .on_next(move |data| match decode(&transformer, data) {
                            Ok(value) => on_next.next(value),
                            Err(err) => on_next.error(err),
                        })
                        .on_error(move |err| on_error.error(err))
                        .on_complete(move || on_complete.complete()),
                );
            Some(sub)
        })
    }

    fn build(self) -> Result<Operation, ClientError> {
        let input = self.client.encode_input(self.input?);
        Ok(Operation {
            id: self.client.next_id.fetch_add(1, Ordering::Relaxed),
            kind: self.kind,
            path: self.path,
            input,
            context: self.context,
            signal: self.signal,
        })
    }
}

fn decode<O: DeserializeOwned>(
    transformer: &Option<CombinedTransformer>,
    data: Value,
) -> Result<O, ClientError> {
    let data = match transformer {
        Some(t) => t.output().deserialize(data),
        None => data,
    };
    serde_json::from_value(data).map_err(ClientError::from)
}
