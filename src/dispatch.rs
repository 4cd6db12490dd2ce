use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;

use crate::{
    error::ExecError,
    middleware::{Chain, Next},
    procedure::{ProcedureMeta, ProcedureOutput},
    Error, Procedure, ProcedureKind,
};

/// Run a procedure: validate the input, run the middleware chain around the resolver and
/// validate the output.
///
/// Panics inside middleware or the resolver are caught and returned as
/// [`ErrorCode::InternalServerError`](crate::ErrorCode::InternalServerError). The returned future
/// doesn't borrow `procedure` so it can be spawned.
pub fn call_procedure<TCtx>(
    procedure: &Procedure<TCtx>,
    ctx: TCtx,
    raw_input: Value,
    path: &str,
    kind: ProcedureKind,
) -> BoxFuture<'static, Result<ProcedureOutput, Error>>
where
    TCtx: Clone + Send + 'static,
{
    let procedure = procedure.clone();
    let path: Arc<str> = path.into();

    let fut = async move {
        let input = procedure.validate_input(raw_input.clone())?;
        let resolve = (procedure.prepare)(input.clone())?;

        let next = Next {
            index: 0,
            chain: Arc::new(Chain {
                middleware: procedure.middleware.clone(),
                meta: ProcedureMeta {
                    path,
                    kind,
                    data: procedure.meta.clone(),
                },
                input,
                raw_input,
            }),
            resolve,
        };

        next.exec(ctx).await.map(|out| out.data)
    };

    AssertUnwindSafe(fut)
        .catch_unwind()
        .map(|result| {
            let result = result.unwrap_or_else(|_| Err(ExecError::Panicked.into()));

            #[cfg(feature = "tracing")]
            match &result {
                Err(err) if err.code() == crate::ErrorCode::InternalServerError => {
                    tracing::error!("procedure failed: {err}")
                }
                Err(err) => tracing::debug!("procedure failed: {err}"),
                Ok(_) => {}
            }

            result
        })
        .boxed()
}
