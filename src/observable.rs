//! A minimal push-based stream with teardown.
//!
//! Used for the values a subscription procedure emits on the server and for the values a client
//! receives back from a subscription operation.

use std::{
    fmt,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

use futures::{channel::mpsc, Stream, StreamExt};

use crate::Error;

type NextFn<T> = Arc<dyn Fn(T) + Send + Sync>;
type ErrorFn<E> = Arc<dyn Fn(E) + Send + Sync>;
type CompleteFn = Arc<dyn Fn() + Send + Sync>;

/// A possibly partial set of callbacks. Missing callbacks are no-ops.
pub struct Observer<T, E = Error> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn<E>>,
    complete: Option<CompleteFn>,
}

impl<T, E> Clone for Observer<T, E> {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
            error: self.error.clone(),
            complete: self.complete.clone(),
        }
    }
}

impl<T, E> Default for Observer<T, E> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }
}

impl<T, E> Observer<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_next(mut self, f: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.next = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(E) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete = Some(Arc::new(f));
        self
    }
}

/// What to run when a subscription ends.
pub enum Teardown {
    None,
    Fn(Box<dyn FnOnce() + Send>),
    Subscription(Subscription),
}

impl Teardown {
    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
        Self::Fn(Box::new(f))
    }

    fn run(self) {
        match self {
            Teardown::None => {}
            Teardown::Fn(f) => f(),
            Teardown::Subscription(sub) => sub.unsubscribe(),
        }
    }
}

impl From<()> for Teardown {
    fn from(_: ()) -> Self {
        Teardown::None
    }
}

impl From<Subscription> for Teardown {
    fn from(sub: Subscription) -> Self {
        Teardown::Subscription(sub)
    }
}

impl From<Option<Subscription>> for Teardown {
    fn from(sub: Option<Subscription>) -> Self {
        sub.map(Teardown::Subscription).unwrap_or(Teardown::None)
    }
}

enum TeardownSlot {
    /// The subscribe function hasn't returned yet.
    Pending,
    Set(Teardown),
    Done,
}

struct Inner<T, E> {
    closed: AtomicBool,
    observer: Mutex<Option<Observer<T, E>>>,
    teardown: Mutex<TeardownSlot>,
}

trait Close: Send + Sync {
    fn close(&self);
    fn is_closed(&self) -> bool;
}

impl<T: Send + 'static, E: Send + 'static> Inner<T, E> {
    fn take_observer(&self) -> Option<Observer<T, E>> {
        self.observer
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
    }

    fn run_teardown(&self) {
        let teardown = {
            let mut slot = self.teardown.lock().unwrap_or_else(|err| err.into_inner());
            match std::mem::replace(&mut *slot, TeardownSlot::Done) {
                TeardownSlot::Set(teardown) => Some(teardown),
                // `subscribe` will see `closed` and run it once it has the teardown.
                TeardownSlot::Pending => {
                    *slot = TeardownSlot::Pending;
                    None
                }
                TeardownSlot::Done => None,
            }
        };

        if let Some(teardown) = teardown {
            teardown.run();
        }
    }

    fn store_teardown(&self, teardown: Teardown) {
        let run_now = {
            let mut slot = self.teardown.lock().unwrap_or_else(|err| err.into_inner());
            if self.closed.load(Ordering::SeqCst) {
                *slot = TeardownSlot::Done;
                Some(teardown)
            } else {
                *slot = TeardownSlot::Set(teardown);
                None
            }
        };

        if let Some(teardown) = run_now {
            teardown.run();
        }
    }
}

impl<T: Send + 'static, E: Send + 'static> Close for Inner<T, E> {
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.take_observer());
        self.run_teardown();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The full observer handed to an [`Observable`]'s subscribe function.
///
/// Once `error` or `complete` has been called, or the consumer unsubscribed, every further call is dropped.
pub struct Subscriber<T, E = Error> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for Subscriber<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static, E: Send + 'static> Subscriber<T, E> {
    pub fn next(&self, value: T) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let next = self
            .inner
            .observer
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .as_ref()
            .and_then(|o| o.next.clone());
        if let Some(next) = next {
            next(value);
        }
    }

    pub fn error(&self, err: E) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(f) = self.inner.take_observer().and_then(|o| o.error) {
            f(err);
        }
        self.inner.run_teardown();
    }

    pub fn complete(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(f) = self.inner.take_observer().and_then(|o| o.complete) {
            f();
        }
        self.inner.run_teardown();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Handle returned from [`Observable::subscribe`].
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<dyn Close>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Subscription {
    /// Idempotent. Runs the teardown if it hasn't already run.
    pub fn unsubscribe(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

type SubscribeFn<T, E> = dyn Fn(Subscriber<T, E>) -> Teardown + Send + Sync;

/// A cold push stream. Every call to [`Observable::subscribe`] runs the subscribe function again.
pub struct Observable<T, E = Error> {
    subscribe_fn: Arc<SubscribeFn<T, E>>,
}

impl<T, E> Clone for Observable<T, E> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: self.subscribe_fn.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Observable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

/// Shorthand for [`Observable::new`].
pub fn observable<T, E, R>(
    subscribe_fn: impl Fn(Subscriber<T, E>) -> R + Send + Sync + 'static,
) -> Observable<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    R: Into<Teardown>,
{
    Observable::new(subscribe_fn)
}

impl<T: Send + 'static, E: Send + 'static> Observable<T, E> {
    pub fn new<R: Into<Teardown>>(
        subscribe_fn: impl Fn(Subscriber<T, E>) -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            subscribe_fn: Arc::new(move |subscriber| subscribe_fn(subscriber).into()),
        }
    }

    pub fn subscribe(&self, observer: Observer<T, E>) -> Subscription {
        let inner = Arc::new(Inner {
            closed: AtomicBool::new(false),
            observer: Mutex::new(Some(observer)),
            teardown: Mutex::new(TeardownSlot::Pending),
        });

        let teardown = (self.subscribe_fn)(Subscriber {
            inner: inner.clone(),
        });
        inner.store_teardown(teardown);

        Subscription { inner }
    }

    pub fn map<U: Send + 'static>(
        &self,
        f: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Observable<U, E> {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::new(move |subscriber: Subscriber<U, E>| {
            let f = f.clone();
            source.subscribe(forward(subscriber, move |s, value| s.next(f(value))))
        })
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::new(move |subscriber: Subscriber<T, E>| {
            let predicate = predicate.clone();
            source.subscribe(forward(subscriber, move |s, value| {
                if predicate(&value) {
                    s.next(value);
                }
            }))
        })
    }

    /// Run a side effect for every value without changing it.
    pub fn tap(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::new(move |subscriber: Subscriber<T, E>| {
            let f = f.clone();
            source.subscribe(forward(subscriber, move |s, value| {
                f(&value);
                s.next(value);
            }))
        })
    }

    pub fn map_err<E2: Send + 'static>(
        &self,
        f: impl Fn(E) -> E2 + Send + Sync + 'static,
    ) -> Observable<T, E2> {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::new(move |subscriber: Subscriber<T, E2>| {
            let (on_next, on_error, on_complete) =
                (subscriber.clone(), subscriber.clone(), subscriber);
            let f = f.clone();
            source.subscribe(
                Observer::new()
                    .on_next(move |value| on_next.next(value))
                    .on_error(move |err| on_error.error(f(err)))
                    .on_complete(move || on_complete.complete()),
            )
        })
    }

    /// Drive a stream on the tokio runtime. The stream is consumed by the first subscriber,
    /// later subscribers complete immediately.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        let stream = Mutex::new(Some(stream));
        Observable::new(move |subscriber: Subscriber<T, E>| {
            let Some(stream) = stream.lock().unwrap_or_else(|err| err.into_inner()).take() else {
                subscriber.complete();
                return Teardown::None;
            };

            let handle = tokio::spawn(async move {
                let mut stream = std::pin::pin!(stream);
                while let Some(item) = stream.next().await {
                    if subscriber.is_closed() {
                        return;
                    }
                    match item {
                        Ok(value) => subscriber.next(value),
                        Err(err) => {
                            subscriber.error(err);
                            return;
                        }
                    }
                }
                subscriber.complete();
            });
            Teardown::from_fn(move || handle.abort())
        })
    }

    /// Subscribe and expose the values as a [`Stream`]. Dropping the stream unsubscribes.
    pub fn into_stream(self) -> ObservableStream<T, E> {
        let (tx, rx) = mpsc::unbounded();
        let (tx_next, tx_err, tx_complete) = (tx.clone(), tx.clone(), tx);
        let subscription = self.subscribe(
            Observer::new()
                .on_next(move |value| {
                    let _ = tx_next.unbounded_send(Ok(value));
                })
                .on_error(move |err| {
                    let _ = tx_err.unbounded_send(Err(err));
                    tx_err.close_channel();
                })
                .on_complete(move || tx_complete.close_channel()),
        );

        ObservableStream {
            rx,
            subscription,
        }
    }
}

fn forward<T, U, E>(
    subscriber: Subscriber<U, E>,
    on_next: impl Fn(&Subscriber<U, E>, T) + Send + Sync + 'static,
) -> Observer<T, E>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    let (s_next, s_err, s_complete) = (subscriber.clone(), subscriber.clone(), subscriber);
    Observer::new()
        .on_next(move |value| on_next(&s_next, value))
        .on_error(move |err| s_err.error(err))
        .on_complete(move || s_complete.complete())
}

/// See [`Observable::into_stream`].
pub struct ObservableStream<T, E = Error> {
    rx: mpsc::UnboundedReceiver<Result<T, E>>,
    subscription: Subscription,
}

impl<T, E> ObservableStream<T, E> {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T, E> Stream for ObservableStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

impl<T, E> Drop for ObservableStream<T, E> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn teardown_runs_once_on_unsubscribe() {
        let teardowns = counter();
        let t = teardowns.clone();
        let obs = Observable::<u32>::new(move |s| {
            s.next(1);
            let t = t.clone();
            Teardown::from_fn(move || {
                t.fetch_add(1, Ordering::SeqCst);
            })
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = obs.subscribe(Observer::new().on_next(move |v| s.lock().unwrap().push(v)));
        sub.unsubscribe();
        sub.unsubscribe();

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(sub.is_closed());
    }

    #[test]
    fn synchronous_complete_runs_teardown_after_subscribe_returns() {
        let teardowns = counter();
        let completes = counter();
        let t = teardowns.clone();
        let obs = Observable::<u32>::new(move |s| {
            s.next(1);
            s.complete();
            s.next(2);
            let t = t.clone();
            Teardown::from_fn(move || {
                t.fetch_add(1, Ordering::SeqCst);
            })
        });

        let c = completes.clone();
        let sub = obs.subscribe(Observer::new().on_complete(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_next_after_error() {
        let subscriber = Arc::new(Mutex::new(None));
        let slot = subscriber.clone();
        let obs = Observable::<u32>::new(move |s| {
            *slot.lock().unwrap() = Some(s);
        });

        let nexts = counter();
        let errors = counter();
        let (n, e) = (nexts.clone(), errors.clone());
        obs.subscribe(
            Observer::new()
                .on_next(move |_| {
                    n.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_| {
                    e.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let s = subscriber.lock().unwrap().take().unwrap();
        s.next(1);
        s.error(crate::ErrorCode::Timeout.into());
        s.next(2);
        s.error(crate::ErrorCode::Timeout.into());
        s.complete();

        assert_eq!(nexts.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(s.is_closed());
    }

    #[test]
    fn operators_compose() {
        let obs = Observable::<u32>::new(|s| {
            for i in 1..=6 {
                s.next(i);
            }
            s.complete();
        });

        let tapped = counter();
        let t = tapped.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        obs.tap(move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        })
        .filter(|v| v % 2 == 0)
        .map(|v| v * 10)
        .subscribe(Observer::new().on_next(move |v| s.lock().unwrap().push(v)));

        assert_eq!(*seen.lock().unwrap(), vec![20, 40, 60]);
        assert_eq!(tapped.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn unsubscribing_downstream_tears_down_upstream() {
        let teardowns = counter();
        let t = teardowns.clone();
        let obs = Observable::<u32>::new(move |_| {
            let t = t.clone();
            Teardown::from_fn(move || {
                t.fetch_add(1, Ordering::SeqCst);
            })
        });

        let sub = obs.map(|v| v + 1).subscribe(Observer::new());
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        sub.unsubscribe();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_bridge() {
        let obs = Observable::<u32>::from_stream(futures::stream::iter(vec![Ok(1), Ok(2), Ok(3)]));
        let values: Vec<_> = obs.into_stream().collect().await;
        assert_eq!(values, vec![Ok(1), Ok(2), Ok(3)]);
    }
}
