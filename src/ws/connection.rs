use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    dispatch::call_procedure,
    envelope::ErrorShape,
    error::ExecError,
    observable::{Observer, Subscription},
    request::{context_fn, ContextFn, RequestInfo},
    Error, Observable, ProcedureKind, ProcedureOutput, Router,
};

use super::jsonrpc::{Params, Request, RequestId, Response, ResponseResult};

/// Creates a [`Connection`] for every accepted socket.
pub struct WsHandler<TCtx> {
    router: Arc<Router<TCtx>>,
    ctx_fn: ContextFn<TCtx>,
    expose_stack: bool,
}

impl<TCtx> Clone for WsHandler<TCtx> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            ctx_fn: self.ctx_fn.clone(),
            expose_stack: self.expose_stack,
        }
    }
}

impl<TCtx> WsHandler<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    /// `ctx_fn` runs once per inbound message with the upgrade request's details.
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
            expose_stack: false,
        }
    }

    pub fn expose_stack(mut self, expose: bool) -> Self {
        self.expose_stack = expose;
        self
    }

    /// Frames for the client are pushed into `tx`, the caller is responsible for writing them to
    /// the socket.
    pub fn connection(&self, info: RequestInfo, tx: mpsc::UnboundedSender<String>) -> Connection<TCtx> {
        Connection {
            router: self.router.clone(),
            ctx_fn: self.ctx_fn.clone(),
            info: Arc::new(info),
            tx,
            subscriptions: Default::default(),
            closed: Default::default(),
            expose_stack: self.expose_stack,
        }
    }
}

enum Slot {
    /// Registered, but the procedure hasn't been subscribed to yet.
    Starting,
    Active(Subscription),
}

type SubscriptionMap = Arc<Mutex<HashMap<RequestId, Slot>>>;

/// One client socket. Tracks the live subscriptions started over it.
pub struct Connection<TCtx> {
    router: Arc<Router<TCtx>>,
    ctx_fn: ContextFn<TCtx>,
    info: Arc<RequestInfo>,
    tx: mpsc::UnboundedSender<String>,
    subscriptions: SubscriptionMap,
    closed: Arc<AtomicBool>,
    expose_stack: bool,
}

impl<TCtx> Clone for Connection<TCtx> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            ctx_fn: self.ctx_fn.clone(),
            info: self.info.clone(),
            tx: self.tx.clone(),
            subscriptions: self.subscriptions.clone(),
            closed: self.closed.clone(),
            expose_stack: self.expose_stack,
        }
    }
}

impl<TCtx> Connection<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    /// Handle one inbound text frame.
    ///
    /// Registration and `subscription.stop` happen before this returns, so frames must be passed
    /// in the order they arrived. The returned future does the rest and may be spawned.
    pub fn handle_message(&self, text: &str) -> BoxFuture<'static, ()> {
        if self.closed.load(Ordering::SeqCst) {
            return async {}.boxed();
        }

        let req = match parse_request(text) {
            Ok(req) => req,
            Err((id, err)) => {
                self.send_error(id, &err, None);
                return async {}.boxed();
            }
        };

        let Some(kind) = req.method.kind() else {
            self.stop(&req.id);
            return async {}.boxed();
        };

        let Params { path, input } = req.params.unwrap_or(Params {
            path: String::new(),
            input: Value::Null,
        });

        if kind == ProcedureKind::Subscription {
            if let Err(err) = self.register(&req.id) {
                self.send_error(req.id, &err, Some(&path));
                return async {}.boxed();
            }
        }

        let this = self.clone();
        async move { this.execute(req.id, kind, path, input).await }.boxed()
    }

    /// Tear down every subscription started over this connection. Later frames are ignored.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let drained: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        #[cfg(feature = "tracing")]
        tracing::debug!("closing connection with {} subscriptions", drained.len());

        for slot in drained {
            if let Slot::Active(sub) = slot {
                sub.unsubscribe();
            }
        }
    }

    /// Number of subscriptions that are registered and not yet finished.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    fn register(&self, id: &RequestId) -> Result<(), Error> {
        if *id == RequestId::Null {
            return Err(ExecError::SubscriptionWithNullId.into());
        }

        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        if subscriptions.contains_key(id) {
            return Err(ExecError::DuplicateSubscriptionId(id.to_string()).into());
        }
        subscriptions.insert(id.clone(), Slot::Starting);
        Ok(())
    }

    fn stop(&self, id: &RequestId) {
        let slot = self
            .subscriptions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(id);

        // A `Starting` slot is picked up by `execute` once it has the subscription.
        if let Some(Slot::Active(sub)) = slot {
            sub.unsubscribe();
        }
    }

    async fn execute(self, id: RequestId, kind: ProcedureKind, path: String, input: Value) {
        let result = match self.call(kind, &path, input).await {
            Ok(ProcedureOutput::Subscription(obs)) if kind == ProcedureKind::Subscription => {
                return self.subscribe(id, path, obs);
            }
            Ok(ProcedureOutput::Value(data)) if kind != ProcedureKind::Subscription => Ok(data),
            Ok(_) => Err(Error::from(ExecError::MethodNotSupported {
                method: kind.as_str().into(),
                kind,
            })),
            Err(err) => Err(err),
        };

        if kind == ProcedureKind::Subscription {
            self.remove(&id);
        }

        match result {
            Ok(data) => {
                let data = match self.router.get_transformer() {
                    Some(t) => t.output().serialize(data),
                    None => data,
                };
                self.send(&Response::Result {
                    id,
                    result: ResponseResult::Data { data },
                });
            }
            Err(err) => self.send_error(id, &err, Some(&path)),
        }
    }

    async fn call(
        &self,
        kind: ProcedureKind,
        path: &str,
        input: Value,
    ) -> Result<ProcedureOutput, Error> {
        let ctx = (self.ctx_fn)((*self.info).clone()).await?;
        let procedure = self.router.resolve(path)?;
        if procedure.kind() != kind {
            return Err(ExecError::MethodNotSupported {
                method: kind.as_str().into(),
                kind: procedure.kind(),
            }
            .into());
        }

        let input = match self.router.get_transformer() {
            Some(t) => t.input().deserialize(input),
            None => input,
        };
        call_procedure(procedure, ctx, input, path, kind).await
    }

    fn subscribe(&self, id: RequestId, path: String, obs: Observable<Value>) {
        let (on_next, on_error, on_complete) = (self.clone(), self.clone(), self.clone());
        let (next_id, error_id, complete_id) = (id.clone(), id.clone(), id.clone());
        let path = Arc::<str>::from(path);

        let sub = obs.subscribe(
            Observer::new()
                .on_next(move |data| {
                    let data = match on_next.router.get_transformer() {
                        Some(t) => t.output().serialize(data),
                        None => data,
                    };
                    on_next.send(&Response::Result {
                        id: next_id.clone(),
                        result: ResponseResult::Data { data },
                    });
                })
                .on_error(move |err: Error| {
                    on_error.remove(&error_id);
                    on_error.send_error(error_id.clone(), &err, Some(&path));
                })
                .on_complete(move || {
                    on_complete.remove(&complete_id);
                    on_complete.send(&Response::Result {
                        id: complete_id.clone(),
                        result: ResponseResult::Stopped,
                    });
                }),
        );

        let started = {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .unwrap_or_else(|err| err.into_inner());
            match subscriptions.get_mut(&id) {
                Some(slot) if matches!(*slot, Slot::Starting) => {
                    *slot = Slot::Active(sub.clone());
                    true
                }
                _ => false,
            }
        };

        // Stopped, closed or already finished while we were subscribing.
        if !started {
            sub.unsubscribe();
        }
    }

    fn remove(&self, id: &RequestId) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(id);
    }

    fn send(&self, resp: &Response) {
        let Ok(text) = serde_json::to_string(resp) else {
            return;
        };
        if let Err(_err) = self.tx.send(text) {
            #[cfg(feature = "tracing")]
            tracing::error!("failed to send websocket frame: {}", _err);
        }
    }

    fn send_error(&self, id: RequestId, err: &Error, path: Option<&str>) {
        self.send(&Response::Error {
            id,
            error: ErrorShape::new(err, path, self.expose_stack),
        });
    }
}

fn parse_request(text: &str) -> Result<Request, (RequestId, Error)> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| (RequestId::Null, ExecError::InvalidJson(err).into()))?;

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
        .unwrap_or(RequestId::Null);

    serde_json::from_value(value).map_err(|err| (id, ExecError::InvalidFrame(err).into()))
}
