use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use linkrpc::ProcedureKind;
use moka::sync::Cache;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    link::{Link, LinkOutput, Next},
    Operation,
};

/// Configuration for [`CacheLink`].
///
/// Serving stale data hides failures of the background refresh from the caller: the stale value
/// is kept and returned until a refresh succeeds.
#[derive(Debug, Clone, Copy)]
pub struct CacheLinkOptions {
    /// How long a value is served without revalidating. Defaults to 3 seconds.
    pub ttl: Duration,
    /// Maximum number of cached results. Defaults to 1000.
    pub max_capacity: u64,
}

impl Default for CacheLinkOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3),
            max_capacity: 1000,
        }
    }
}

#[derive(Clone)]
struct Entry {
    data: Value,
    stored_at: Instant,
}

/// Stale-while-revalidate cache for query results, keyed by path and input.
///
/// A fresh hit settles immediately without calling the rest of the chain. A stale hit also
/// settles immediately with the stale value and refreshes the entry in the background. Errors
/// are never cached.
#[derive(Clone)]
pub struct CacheLink {
    cache: Cache<String, Entry>,
    refreshing: Arc<Mutex<HashSet<String>>>,
    opts: CacheLinkOptions,
}

impl Default for CacheLink {
    fn default() -> Self {
        Self::new(CacheLinkOptions::default())
    }
}

impl CacheLink {
    pub fn new(opts: CacheLinkOptions) -> Self {
        Self {
            cache: Cache::new(opts.max_capacity),
            refreshing: Default::default(),
            opts,
        }
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    fn revalidate(&self, key: String, op: Operation, next: Next) {
        let inserted = self
            .refreshing
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(key.clone());
        if !inserted {
            return;
        }

        let cache = self.cache.clone();
        let refreshing = self.refreshing.clone();
        tokio::spawn(async move {
            // The caller already has its answer, so its cancellation doesn't apply here.
            let op = Operation { signal: None, ..op };
            match next.run(op).response().await {
                Ok(data) => cache.insert(
                    key.clone(),
                    Entry {
                        data,
                        stored_at: Instant::now(),
                    },
                ),
                Err(err) => tracing::debug!("background refresh failed: {err}"),
            }
            refreshing
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .remove(&key);
        });
    }
}

impl Link for CacheLink {
    fn call(&self, op: Operation, next: Next) -> LinkOutput {
        if op.kind != ProcedureKind::Query {
            return next.run(op);
        }

        let key = op.fingerprint();
        match self.cache.get(&key) {
            Some(entry) if entry.stored_at.elapsed() <= self.opts.ttl => {
                LinkOutput::Ready(Ok(entry.data))
            }
            Some(entry) => {
                self.revalidate(key, op, next);
                LinkOutput::Ready(Ok(entry.data))
            }
            None => {
                let cache = self.cache.clone();
                let out = next.run(op);
                LinkOutput::future(async move {
                    let data = out.response().await?;
                    cache.insert(
                        key,
                        Entry {
                            data: data.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                    Ok(data)
                })
            }
        }
    }
}
