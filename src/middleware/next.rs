use std::{fmt, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;

use crate::{
    procedure::{ProcedureMeta, Resolve},
    ProcedureKind,
};

use super::{Middleware, MiddlewareOutput, MiddlewareResult};

pub(crate) struct Chain<TCtx> {
    pub(crate) middleware: Arc<[Middleware<TCtx>]>,
    pub(crate) meta: ProcedureMeta,
    pub(crate) input: Value,
    pub(crate) raw_input: Value,
}

/// The continuation handed to a [`Middleware`]. Consumed by [`Next::exec`].
pub struct Next<TCtx> {
    pub(crate) index: usize,
    pub(crate) chain: Arc<Chain<TCtx>>,
    pub(crate) resolve: Resolve<TCtx>,
}

impl<TCtx> fmt::Debug for Next<TCtx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("path", &self.chain.meta.path())
            .finish()
    }
}

impl<TCtx> Next<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    pub fn meta(&self) -> ProcedureMeta {
        self.chain.meta.clone()
    }

    pub fn path(&self) -> &str {
        self.chain.meta.path()
    }

    pub fn kind(&self) -> ProcedureKind {
        self.chain.meta.kind()
    }

    /// The input as it arrived, before the input validator ran.
    pub fn raw_input(&self) -> &Value {
        &self.chain.raw_input
    }

    /// Run the rest of the chain. `ctx` only affects the steps after this one.
    pub fn exec(self, ctx: TCtx) -> BoxFuture<'static, MiddlewareResult<TCtx>> {
        let Self {
            index,
            chain,
            resolve,
        } = self;

        match chain.middleware.get(index).cloned() {
            Some(mw) => {
                let input = chain.input.clone();
                (mw.handler)(
                    ctx,
                    input,
                    Next {
                        index: index + 1,
                        chain,
                        resolve,
                    },
                )
            }
            None => async move {
                let data = resolve(ctx.clone()).await?;
                Ok(MiddlewareOutput { data, ctx })
            }
            .boxed(),
        }
    }
}
