#![allow(dead_code)]

use std::sync::{atomic::AtomicUsize, Arc};

use futures::StreamExt;
use linkrpc::{Error, Observable};

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Subscribe and wait for the observable to finish.
pub async fn collect<T: Send + 'static>(obs: Observable<T>) -> Vec<Result<T, Error>> {
    obs.into_stream().collect().await
}
