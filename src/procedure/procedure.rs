use std::{fmt, sync::Arc};

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::{
    error::ExecError, middleware::Middleware, observable::Observer, Error, Observable,
    ProcedureKind,
};

use super::{ProcedureBuilder, ProcedureMeta, Validator};

/// What a procedure produces: a single value for queries and mutations, a stream of values for
/// subscriptions.
#[derive(Debug, Clone)]
pub enum ProcedureOutput {
    Value(Value),
    Subscription(Observable<Value>),
}

impl ProcedureOutput {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Subscription(_) => None,
        }
    }

    pub fn into_observable(self) -> Option<Observable<Value>> {
        match self {
            Self::Value(_) => None,
            Self::Subscription(obs) => Some(obs),
        }
    }
}

pub(crate) type Resolve<TCtx> =
    Box<dyn FnOnce(TCtx) -> BoxFuture<'static, Result<ProcedureOutput, Error>> + Send>;

/// Decodes the validated input into the resolver's argument type and returns the resolver call
/// waiting on its final context.
pub(crate) type Prepare<TCtx> = dyn Fn(Value) -> Result<Resolve<TCtx>, Error> + Send + Sync;

/// A frozen procedure definition.
///
/// Build one with [`Procedure::builder`].
pub struct Procedure<TCtx> {
    pub(crate) kind: ProcedureKind,
    pub(crate) middleware: Arc<[Middleware<TCtx>]>,
    pub(crate) input: Option<Validator>,
    pub(crate) output: Option<Validator>,
    pub(crate) meta: Arc<Map<String, Value>>,
    pub(crate) prepare: Arc<Prepare<TCtx>>,
}

impl<TCtx> Clone for Procedure<TCtx> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            middleware: self.middleware.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            meta: self.meta.clone(),
            prepare: self.prepare.clone(),
        }
    }
}

impl<TCtx> fmt::Debug for Procedure<TCtx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("kind", &self.kind)
            .field("middleware", &self.middleware.len())
            .field("meta", &self.meta)
            .finish()
    }
}

impl<TCtx> Procedure<TCtx>
where
    TCtx: Send + 'static,
{
    pub fn builder() -> ProcedureBuilder<TCtx> {
        ProcedureBuilder::default()
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn meta(&self, path: &str) -> ProcedureMeta {
        ProcedureMeta {
            path: path.into(),
            kind: self.kind,
            data: self.meta.clone(),
        }
    }

    pub(crate) fn validate_input(&self, raw: Value) -> Result<Value, Error> {
        match &self.input {
            Some(v) => v
                .validate(raw)
                .map_err(|err| ExecError::InvalidInput(Box::new(err)).into()),
            None => Ok(raw),
        }
    }
}

/// Apply the output validator to a resolver's result. Subscriptions are checked per item, a
/// failing item ends the subscription with an error.
pub(crate) fn validate_output(
    validator: Option<&Validator>,
    output: ProcedureOutput,
) -> Result<ProcedureOutput, Error> {
    let Some(validator) = validator.cloned() else {
        return Ok(output);
    };

    match output {
        ProcedureOutput::Value(v) => validator
            .validate(v)
            .map(ProcedureOutput::Value)
            .map_err(|err| ExecError::InvalidOutput(Box::new(err)).into()),
        ProcedureOutput::Subscription(source) => {
            Ok(ProcedureOutput::Subscription(Observable::new(move |subscriber| {
                let validator = validator.clone();
                let (s_next, s_err, s_complete) =
                    (subscriber.clone(), subscriber.clone(), subscriber);
                source.subscribe(
                    Observer::new()
                        .on_next(move |v| match validator.validate(v) {
                            Ok(v) => s_next.next(v),
                            Err(err) => s_next.error(ExecError::InvalidOutput(Box::new(err)).into()),
                        })
                        .on_error(move |err| s_err.error(err))
                        .on_complete(move || s_complete.complete()),
                )
            })))
        }
    }
}
