use std::time::Duration;

use linkrpc::ProcedureKind;
use rand::Rng;

use crate::{
    link::{cancellable, Link, LinkOutput, Next},
    ClientError, Operation,
};

/// Configuration for [`RetryLink`].
///
/// A query that fails and then succeeds on a later attempt looks like a plain success to the
/// caller. Only the last failure is reported once every attempt is used up.
#[derive(Debug, Clone, Copy)]
pub struct RetryLinkOptions {
    /// Retries after the first attempt. Defaults to 3.
    pub attempts: u32,
    /// Delay before the first retry, doubled for every retry after it. Defaults to 1 second.
    pub delay: Duration,
}

impl Default for RetryLinkOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Retries failed queries with exponential backoff and ±20% jitter.
///
/// Mutations and subscriptions pass straight through. A cancelled operation is never retried.
#[derive(Debug, Clone, Default)]
pub struct RetryLink {
    opts: RetryLinkOptions,
}

impl RetryLink {
    pub fn new(opts: RetryLinkOptions) -> Self {
        Self { opts }
    }
}

impl Link for RetryLink {
    fn call(&self, op: Operation, next: Next) -> LinkOutput {
        if op.kind != ProcedureKind::Query {
            return next.run(op);
        }

        let opts = self.opts;
        LinkOutput::future(async move {
            let mut retries = 0;
            loop {
                let err = match next.run(op.clone()).response().await {
                    Ok(data) => return Ok(data),
                    Err(err) => err,
                };

                if retries >= opts.attempts
                    || op.is_cancelled()
                    || matches!(err, ClientError::Cancelled)
                {
                    return Err(err);
                }

                let delay = backoff(opts.delay, retries);
                tracing::debug!(
                    path = op.path,
                    retry = retries + 1,
                    "query failed, retrying in {delay:?}: {err}"
                );
                cancellable(op.signal.clone(), async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
                retries += 1;
            }
        })
    }
}

fn backoff(initial: Duration, retry: u32) -> Duration {
    let base = initial.saturating_mul(2u32.saturating_pow(retry));
    base.mul_f64(rand::thread_rng().gen_range(0.8..=1.2))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_grows_with_jitter() {
        let initial = Duration::from_millis(100);
        for (retry, expected) in [(0, 100.0), (1, 200.0), (2, 400.0), (3, 800.0)] {
            let ms = backoff(initial, retry).as_secs_f64() * 1000.0;
            assert!(ms >= expected * 0.8 - 0.001 && ms <= expected * 1.2 + 0.001, "{ms}");
        }
    }
}
