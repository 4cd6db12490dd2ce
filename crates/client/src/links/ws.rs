use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use futures::{future::BoxFuture, FutureExt};
use linkrpc::{
    ws::jsonrpc::{Method, Params, Request, RequestId, Response, ResponseResult},
    Observable, ProcedureKind, Subscriber, Teardown,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::{
    link::{cancellable, Link, LinkOutput, LinkResult, Next},
    ClientError, Operation,
};

/// The two halves of an open socket, as text frames.
///
/// The receiver ending means the socket closed.
#[derive(Debug)]
pub struct WsChannel {
    pub sender: mpsc::UnboundedSender<String>,
    pub receiver: mpsc::UnboundedReceiver<String>,
}

impl WsChannel {
    /// A channel pair for wiring a socket by hand. Returns the link's end and the socket's end,
    /// frames sent on one come out of the other.
    pub fn pair() -> (WsChannel, WsChannel) {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        (
            WsChannel {
                sender: client_tx,
                receiver: client_rx,
            },
            WsChannel {
                sender: server_tx,
                receiver: server_rx,
            },
        )
    }
}

/// Opens the socket for a [`WsLink`].
pub trait WsConnector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<WsChannel, ClientError>>;
}

impl<F, Fut> WsConnector for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WsChannel, ClientError>> + Send + 'static,
{
    fn connect(&self) -> BoxFuture<'static, Result<WsChannel, ClientError>> {
        self().boxed()
    }
}

struct Connected {
    generation: u64,
    sender: mpsc::UnboundedSender<String>,
}

/// Everything waiting on the socket, keyed by request id. Entries remember which connection
/// they were sent over.
#[derive(Default)]
struct State {
    conn: Option<Connected>,
    generation: u64,
    pending: HashMap<u64, (u64, oneshot::Sender<LinkResult>)>,
    subscriptions: HashMap<u64, (u64, Subscriber<Value, ClientError>)>,
}

struct Inner {
    connector: Box<dyn WsConnector>,
    connecting: tokio::sync::Mutex<()>,
    state: Mutex<State>,
    next_id: AtomicU64,
}

/// Terminating link multiplexing every operation over one WebSocket.
///
/// Frames carry ids assigned by the link, so several clients can share a socket. The mapping to
/// [`Operation::id`] is logged at `debug`.
///
/// The socket is opened by the first operation. When it closes, everything waiting on it fails
/// with [`ClientError::ConnectionClosed`] and the next operation opens a new one. Nothing is
/// replayed or resubscribed.
#[derive(Clone)]
pub struct WsLink {
    inner: Arc<Inner>,
}

impl WsLink {
    /// ```rust,no_run
    /// # use linkrpc_client::{WsChannel, WsLink};
    /// let link = WsLink::new(|| async {
    ///     let (link_end, socket_end) = WsChannel::pair();
    ///     // pump `socket_end` to and from a real socket here
    ///     # drop(socket_end);
    ///     Ok(link_end)
    /// });
    /// ```
    pub fn new(connector: impl WsConnector) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Box::new(connector),
                connecting: tokio::sync::Mutex::new(()),
                state: Mutex::new(State::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state().conn.is_some()
    }

    /// Close the socket. Everything waiting on it fails with [`ClientError::ConnectionClosed`].
    pub fn close(&self) {
        let generation = self.inner.state().conn.as_ref().map(|c| c.generation);
        if let Some(generation) = generation {
            self.inner.disconnected(generation);
        }
    }
}

impl Link for WsLink {
    fn call(&self, op: Operation, _next: Next) -> LinkOutput {
        match op.kind {
            ProcedureKind::Subscription => self.subscribe(op),
            _ => self.request(op),
        }
    }
}

impl WsLink {
    fn request(&self, op: Operation) -> LinkOutput {
        let inner = self.inner.clone();
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);

        LinkOutput::future(async move {
            let (tx, rx) = oneshot::channel();
            let result = cancellable(op.signal.clone(), async {
                let frame = request_frame(id, &op)?;
                let (generation, sender) = inner.connection().await?;
                inner.state().pending.insert(id, (generation, tx));
                tracing::debug!(id, op_id = op.id, kind = %op.kind, path = op.path, "sending websocket request");
                sender
                    .send(frame)
                    .map_err(|_| ClientError::ConnectionClosed)?;
                rx.await.map_err(|_| ClientError::ConnectionClosed)?
            })
            .await;

            inner.state().pending.remove(&id);
            result
        })
    }

    fn subscribe(&self, op: Operation) -> LinkOutput {
        let inner = self.inner.clone();

        LinkOutput::Observable(Observable::new(move |subscriber: Subscriber<Value, ClientError>| {
            let id = inner.next_id.fetch_add(1, Ordering::Relaxed);

            let start = {
                let (inner, op) = (inner.clone(), op.clone());
                tokio::spawn(async move {
                    let result = async {
                        let frame = request_frame(id, &op)?;
                        let (generation, sender) = inner.connection().await?;
                        inner
                            .state()
                            .subscriptions
                            .insert(id, (generation, subscriber.clone()));
                        tracing::debug!(id, op_id = op.id, path = op.path, "starting websocket subscription");
                        sender
                            .send(frame)
                            .map_err(|_| ClientError::ConnectionClosed)
                    }
                    .await;

                    if let Err(err) = result {
                        inner.state().subscriptions.remove(&id);
                        subscriber.error(err);
                    }
                })
            };

            let inner = inner.clone();
            Teardown::from_fn(move || {
                start.abort();
                // Only still registered when the consumer unsubscribed first.
                let sender = {
                    let mut state = inner.state();
                    match state.subscriptions.remove(&id) {
                        Some((generation, _)) => state
                            .conn
                            .as_ref()
                            .filter(|c| c.generation == generation)
                            .map(|c| c.sender.clone()),
                        None => None,
                    }
                };
                if let Some(sender) = sender {
                    tracing::debug!(id, "stopping subscription");
                    if let Ok(frame) = serde_json::to_string(&Request {
                        id: RequestId::Number(id),
                        method: Method::SubscriptionStop,
                        params: None,
                    }) {
                        sender.send(frame).ok();
                    }
                }
            })
        }))
    }
}

fn request_frame(id: u64, op: &Operation) -> Result<String, ClientError> {
    Ok(serde_json::to_string(&Request {
        id: RequestId::Number(id),
        method: op.kind.into(),
        params: Some(Params {
            path: op.path.clone(),
            input: op.input.clone(),
        }),
    })?)
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// The open socket, connecting first if there isn't one.
    async fn connection(
        self: &Arc<Self>,
    ) -> Result<(u64, mpsc::UnboundedSender<String>), ClientError> {
        if let Some(conn) = &self.state().conn {
            return Ok((conn.generation, conn.sender.clone()));
        }

        let _connecting = self.connecting.lock().await;
        if let Some(conn) = &self.state().conn {
            return Ok((conn.generation, conn.sender.clone()));
        }

        let WsChannel { sender, receiver } = self.connector.connect().await?;
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.conn = Some(Connected {
                generation: state.generation,
                sender: sender.clone(),
            });
            state.generation
        };
        tracing::debug!(generation, "websocket connected");

        tokio::spawn(self.clone().read(generation, receiver));
        Ok((generation, sender))
    }

    async fn read(self: Arc<Self>, generation: u64, mut receiver: mpsc::UnboundedReceiver<String>) {
        while let Some(text) = receiver.recv().await {
            self.dispatch(&text);
        }
        self.disconnected(generation);
    }

    fn dispatch(&self, text: &str) {
        let resp: Response = match serde_json::from_str(text) {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!("ignoring invalid websocket frame: {err}");
                return;
            }
        };
        let id = match resp.id() {
            RequestId::Number(id) => *id,
            id => {
                tracing::warn!(%id, "ignoring websocket frame for an unknown id");
                return;
            }
        };

        let mut state = self.state();
        if let Some(subscriber) = state.subscriptions.get(&id).map(|(_, s)| s.clone()) {
            match resp {
                Response::Result {
                    result: ResponseResult::Data { data },
                    ..
                } => {
                    drop(state);
                    subscriber.next(data);
                }
                Response::Result {
                    result: ResponseResult::Stopped,
                    ..
                } => {
                    state.subscriptions.remove(&id);
                    drop(state);
                    subscriber.complete();
                }
                Response::Error { error, .. } => {
                    state.subscriptions.remove(&id);
                    drop(state);
                    subscriber.error(error.into());
                }
            }
            return;
        }

        let Some((_, tx)) = state.pending.remove(&id) else {
            tracing::trace!(id, "dropping websocket frame nobody is waiting for");
            return;
        };
        drop(state);

        let result = match resp {
            Response::Result {
                result: ResponseResult::Data { data },
                ..
            } => Ok(data),
            Response::Result {
                result: ResponseResult::Stopped,
                ..
            } => Err(ClientError::Decode(
                "received 'stopped' for a query or mutation".into(),
            )),
            Response::Error { error, .. } => Err(error.into()),
        };
        tx.send(result).ok();
    }

    fn disconnected(&self, generation: u64) {
        let (pending, subscriptions) = {
            let mut state = self.state();
            if state
                .conn
                .as_ref()
                .is_some_and(|c| c.generation == generation)
            {
                state.conn = None;
            }
            (
                drain_generation(&mut state.pending, generation),
                drain_generation(&mut state.subscriptions, generation),
            )
        };
        tracing::debug!(
            generation,
            pending = pending.len(),
            subscriptions = subscriptions.len(),
            "websocket disconnected"
        );

        for tx in pending {
            tx.send(Err(ClientError::ConnectionClosed)).ok();
        }
        for subscriber in subscriptions {
            subscriber.error(ClientError::ConnectionClosed);
        }
    }
}

fn drain_generation<V>(map: &mut HashMap<u64, (u64, V)>, generation: u64) -> Vec<V> {
    let ids: Vec<u64> = map
        .iter()
        .filter(|(_, (g, _))| *g == generation)
        .map(|(id, _)| *id)
        .collect();
    ids.into_iter()
        .filter_map(|id| map.remove(&id).map(|(_, v)| v))
        .collect()
}
