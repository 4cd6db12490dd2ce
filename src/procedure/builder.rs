use std::{fmt, future::Future, sync::Arc};

use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::ExecError, middleware::Middleware, observable::Observer, Error, Observable,
    ProcedureKind,
};

use super::{
    procedure::{validate_output, Prepare, Resolve},
    Procedure, ProcedureOutput, Validator,
};

/// Accumulates middleware, validators and metadata. Every method returns a new builder so a
/// partially configured builder can be cloned and reused as a base for many procedures.
pub struct ProcedureBuilder<TCtx> {
    middleware: Vec<Middleware<TCtx>>,
    input: Option<Validator>,
    output: Option<Validator>,
    meta: Map<String, Value>,
}

impl<TCtx> Default for ProcedureBuilder<TCtx> {
    fn default() -> Self {
        Self {
            middleware: Vec::new(),
            input: None,
            output: None,
            meta: Map::new(),
        }
    }
}

impl<TCtx> Clone for ProcedureBuilder<TCtx> {
    fn clone(&self) -> Self {
        Self {
            middleware: self.middleware.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<TCtx> fmt::Debug for ProcedureBuilder<TCtx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureBuilder")
            .field("middleware", &self.middleware.len())
            .field("meta", &self.meta)
            .finish()
    }
}

impl<TCtx> ProcedureBuilder<TCtx>
where
    TCtx: Clone + Send + 'static,
{
    pub fn input(mut self, validator: Validator) -> Self {
        self.input = Some(validator);
        self
    }

    pub fn output(mut self, validator: Validator) -> Self {
        self.output = Some(validator);
        self
    }

    /// Append a middleware. Middleware run in the order they were added.
    pub fn with(mut self, mw: Middleware<TCtx>) -> Self {
        self.middleware.push(mw);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn query<I, O, E, F>(
        self,
        resolver: impl Fn(TCtx, I) -> F + Send + Sync + 'static,
    ) -> Procedure<TCtx>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize,
        E: Into<Error>,
        F: Future<Output = Result<O, E>> + Send + 'static,
    {
        self.build_value(ProcedureKind::Query, resolver)
    }

    pub fn mutation<I, O, E, F>(
        self,
        resolver: impl Fn(TCtx, I) -> F + Send + Sync + 'static,
    ) -> Procedure<TCtx>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize,
        E: Into<Error>,
        F: Future<Output = Result<O, E>> + Send + 'static,
    {
        self.build_value(ProcedureKind::Mutation, resolver)
    }

    pub fn subscription<I, O, E, F>(
        self,
        resolver: impl Fn(TCtx, I) -> F + Send + Sync + 'static,
    ) -> Procedure<TCtx>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<Error>,
        F: Future<Output = Result<Observable<O>, E>> + Send + 'static,
    {
        let resolver = Arc::new(resolver);
        let output = self.output.clone();
        self.build(ProcedureKind::Subscription, move |input: I| {
            let resolver = resolver.clone();
            let output = output.clone();
            Box::new(move |ctx: TCtx| {
                async move {
                    let obs = resolver(ctx, input).await.map_err(Into::<Error>::into)?;
                    validate_output(
                        output.as_ref(),
                        ProcedureOutput::Subscription(serialize_items(obs)),
                    )
                }
                .boxed()
            })
        })
    }

    fn build_value<I, O, E, F>(
        self,
        kind: ProcedureKind,
        resolver: impl Fn(TCtx, I) -> F + Send + Sync + 'static,
    ) -> Procedure<TCtx>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize,
        E: Into<Error>,
        F: Future<Output = Result<O, E>> + Send + 'static,
    {
        let resolver = Arc::new(resolver);
        let output = self.output.clone();
        self.build(kind, move |input: I| {
            let resolver = resolver.clone();
            let output = output.clone();
            Box::new(move |ctx: TCtx| {
                async move {
                    let value = resolver(ctx, input).await.map_err(Into::<Error>::into)?;
                    let value = serde_json::to_value(value).map_err(ExecError::Serialize)?;
                    validate_output(output.as_ref(), ProcedureOutput::Value(value))
                }
                .boxed()
            })
        })
    }

    fn build<I>(
        self,
        kind: ProcedureKind,
        bind: impl Fn(I) -> Resolve<TCtx> + Send + Sync + 'static,
    ) -> Procedure<TCtx>
    where
        I: DeserializeOwned + Send + 'static,
    {
        let prepare: Arc<Prepare<TCtx>> = Arc::new(move |input: Value| -> Result<Resolve<TCtx>, Error> {
            let input: I = serde_json::from_value(input)
                .map_err(|err| ExecError::InvalidInput(Box::new(err)))?;
            Ok(bind(input))
        });

        Procedure {
            kind,
            middleware: self.middleware.into(),
            input: self.input,
            output: self.output,
            meta: Arc::new(self.meta),
            prepare,
        }
    }
}

fn serialize_items<O: Serialize + Send + 'static>(source: Observable<O>) -> Observable<Value> {
    Observable::new(move |subscriber| {
        let (s_next, s_err, s_complete) = (subscriber.clone(), subscriber.clone(), subscriber);
        source.subscribe(
            Observer::new()
                .on_next(move |v| match serde_json::to_value(v) {
                    Ok(v) => s_next.next(v),
                    Err(err) => s_next.error(ExecError::Serialize(err).into()),
                })
                .on_error(move |err| s_err.error(err))
                .on_complete(move || s_complete.complete()),
        )
    })
}
