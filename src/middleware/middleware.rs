use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;

use crate::{procedure::ProcedureOutput, Error};

use super::Next;

/// What the rest of the chain produced, along with the context it ran with.
#[derive(Debug)]
pub struct MiddlewareOutput<TCtx> {
    pub data: ProcedureOutput,
    pub ctx: TCtx,
}

pub type MiddlewareResult<TCtx> = Result<MiddlewareOutput<TCtx>, Error>;

pub(crate) type MiddlewareHandler<TCtx> =
    dyn Fn(TCtx, Value, Next<TCtx>) -> BoxFuture<'static, MiddlewareResult<TCtx>> + Send + Sync;

/// An abstraction for common logic that can be applied to procedures.
///
/// A middleware receives the current context, the validated input and a [`Next`]. Calling
/// [`Next::exec`] runs the rest of the chain with the given context, not calling it short-circuits
/// the chain so neither downstream middleware nor the resolver run.
///
/// Middleware are applied with [`ProcedureBuilder::with`](crate::procedure::ProcedureBuilder::with).
///
/// ```rust
/// use linkrpc::{middleware::Middleware, Error, ErrorCode};
///
/// #[derive(Clone)]
/// struct Ctx {
///     user: Option<String>,
/// }
///
/// let authed = Middleware::new(|ctx: Ctx, _input, next| async move {
///     if ctx.user.is_none() {
///         return Err(Error::new(ErrorCode::Unauthorized, "login required"));
///     }
///     next.exec(ctx).await
/// });
/// # let _ = authed;
/// ```
pub struct Middleware<TCtx> {
    pub(crate) handler: Arc<MiddlewareHandler<TCtx>>,
}

impl<TCtx> Clone for Middleware<TCtx> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<TCtx> fmt::Debug for Middleware<TCtx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish()
    }
}

impl<TCtx: Send + 'static> Middleware<TCtx> {
    pub fn new<F>(
        handler: impl Fn(TCtx, Value, Next<TCtx>) -> F + Send + Sync + 'static,
    ) -> Self
    where
        F: Future<Output = MiddlewareResult<TCtx>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx, input, next| handler(ctx, input, next).boxed()),
        }
    }
}
