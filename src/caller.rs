use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    dispatch::call_procedure, error::ExecError, Error, Observable, ProcedureKind, ProcedureOutput,
    Router,
};

/// Calls procedures in-process, without going through a transport.
///
/// Inputs and outputs still go through validation and the middleware chain, so this behaves
/// like a remote call minus the wire encoding.
///
/// ```rust
/// use linkrpc::{Caller, Procedure, Router};
///
/// # async fn demo() -> Result<(), linkrpc::Error> {
/// let router = Router::<()>::new().procedure(
///     "greet",
///     Procedure::builder().query(|_, name: String| async move {
///         Ok::<_, linkrpc::Error>(format!("Hello {name}"))
///     }),
/// );
///
/// let greeting: String = Caller::new(router, ()).query("greet", "a").await?;
/// assert_eq!(greeting, "Hello a");
/// # Ok(())
/// # }
/// ```
pub struct Caller<TCtx> {
    router: Arc<Router<TCtx>>,
    ctx: TCtx,
}

impl<TCtx: Clone> Clone for Caller<TCtx> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<TCtx> Caller<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    pub fn new(router: impl Into<Arc<Router<TCtx>>>, ctx: TCtx) -> Self {
        Self {
            router: router.into(),
            ctx,
        }
    }

    pub async fn query<T: DeserializeOwned>(
        &self,
        path: &str,
        input: impl Serialize,
    ) -> Result<T, Error> {
        let value = self.call(ProcedureKind::Query, path, input).await?;
        decode(value)
    }

    pub async fn mutation<T: DeserializeOwned>(
        &self,
        path: &str,
        input: impl Serialize,
    ) -> Result<T, Error> {
        let value = self.call(ProcedureKind::Mutation, path, input).await?;
        decode(value)
    }

    /// Items are left as JSON, use [`Observable::map`] to decode them.
    pub async fn subscription(
        &self,
        path: &str,
        input: impl Serialize,
    ) -> Result<Observable<Value>, Error> {
        let input = serde_json::to_value(input)?;
        match self.dispatch(ProcedureKind::Subscription, path, input).await? {
            ProcedureOutput::Subscription(obs) => Ok(obs),
            ProcedureOutput::Value(_) => Err(mismatch(ProcedureKind::Subscription)),
        }
    }

    async fn call(
        &self,
        kind: ProcedureKind,
        path: &str,
        input: impl Serialize,
    ) -> Result<Value, Error> {
        let input = serde_json::to_value(input)?;
        match self.dispatch(kind, path, input).await? {
            ProcedureOutput::Value(value) => Ok(value),
            ProcedureOutput::Subscription(_) => Err(mismatch(kind)),
        }
    }

    async fn dispatch(
        &self,
        kind: ProcedureKind,
        path: &str,
        input: Value,
    ) -> Result<ProcedureOutput, Error> {
        let procedure = self.router.resolve(path)?;
        if procedure.kind() != kind {
            return Err(ExecError::MethodNotSupported {
                method: kind.as_str().into(),
                kind: procedure.kind(),
            }
            .into());
        }

        call_procedure(procedure, self.ctx.clone(), input, path, kind).await
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|err| ExecError::InvalidOutput(Box::new(err)).into())
}

fn mismatch(kind: ProcedureKind) -> Error {
    ExecError::MethodNotSupported {
        method: kind.as_str().into(),
        kind,
    }
    .into()
}
