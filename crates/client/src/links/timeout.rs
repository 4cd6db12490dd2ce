use std::time::Duration;

use linkrpc::ProcedureKind;
use tokio_util::sync::CancellationToken;

use crate::{
    link::{Link, LinkOutput, Next},
    ClientError, Operation,
};

#[derive(Debug, Clone, Copy)]
pub struct TimeoutLinkOptions {
    /// Defaults to 5 seconds.
    pub timeout: Duration,
}

impl Default for TimeoutLinkOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Fails queries and mutations with [`ClientError::Timeout`] when they take too long, and
/// cancels the downstream call.
///
/// Subscriptions are left alone. An existing cancellation token on the operation still applies:
/// the downstream links get a child of it.
#[derive(Debug, Clone, Default)]
pub struct TimeoutLink {
    opts: TimeoutLinkOptions,
}

impl TimeoutLink {
    pub fn new(opts: TimeoutLinkOptions) -> Self {
        Self { opts }
    }
}

impl Link for TimeoutLink {
    fn call(&self, op: Operation, next: Next) -> LinkOutput {
        if op.kind == ProcedureKind::Subscription {
            return next.run(op);
        }

        let token = match &op.signal {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let timeout = self.opts.timeout;
        let out = next.run(op.with_signal(token.clone()));

        LinkOutput::future(async move {
            match tokio::time::timeout(timeout, out.response()).await {
                Ok(result) => result,
                Err(_) => {
                    token.cancel();
                    Err(ClientError::Timeout(timeout))
                }
            }
        })
    }
}
