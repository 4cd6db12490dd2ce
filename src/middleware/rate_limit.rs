use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

use crate::{Error, ErrorCode};

use super::Middleware;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitOptions {
    /// Maximum number of calls allowed per key within `window`.
    pub limit: u32,
    pub window: Duration,
}

struct Hits {
    count: u32,
    reset: Instant,
}

/// Per-key windows. Keys whose window has passed are swept at most once per window.
struct Limiter {
    opts: RateLimitOptions,
    hits: HashMap<String, Hits>,
    next_sweep: Option<Instant>,
}

impl Limiter {
    fn new(opts: RateLimitOptions) -> Self {
        Self {
            opts,
            hits: HashMap::new(),
            next_sweep: None,
        }
    }

    /// Count a call for `key`. Returns how long until the window resets when over the limit.
    fn hit(&mut self, key: String, now: Instant) -> Option<Duration> {
        match self.next_sweep {
            Some(at) if now <= at => {}
            _ => {
                self.hits.retain(|_, hits| now <= hits.reset);
                self.next_sweep = Some(now + self.opts.window);
            }
        }

        let window = self.opts.window;
        let state = self.hits.entry(key).or_insert(Hits {
            count: 0,
            reset: now + window,
        });
        if now > state.reset {
            state.count = 0;
            state.reset = now + window;
        }
        state.count += 1;

        (state.count > self.opts.limit).then(|| state.reset.saturating_duration_since(now))
    }
}

/// Fixed-window, in-memory rate limiting keyed by `key_fn`.
///
/// Calls over the limit fail with [`ErrorCode::TooManyRequests`] without running the rest of the chain.
pub fn rate_limit<TCtx>(
    opts: RateLimitOptions,
    key_fn: impl Fn(&TCtx) -> String + Send + Sync + 'static,
) -> Middleware<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    let limiter = Arc::new(Mutex::new(Limiter::new(opts)));
    let key_fn = Arc::new(key_fn);

    Middleware::new(move |ctx, _input, next| {
        let key = key_fn(&ctx);
        let over = limiter
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .hit(key, Instant::now());

        async move {
            if let Some(retry_in) = over {
                return Err(Error::new(
                    ErrorCode::TooManyRequests,
                    format!(
                        "Rate limit exceeded. Retry in {}s",
                        retry_in.as_secs() + u64::from(retry_in.subsec_nanos() > 0)
                    ),
                ));
            }

            next.exec(ctx).await
        }
    })
}
