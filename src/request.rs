use std::{future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::Error;

/// Transport-level details of the request a context is being created for.
///
/// For WebSocket connections this describes the upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    /// Case-insensitive header lookup. Returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

pub(crate) fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub(crate) type ContextFn<TCtx> =
    Arc<dyn Fn(RequestInfo) -> BoxFuture<'static, Result<TCtx, Error>> + Send + Sync>;

pub(crate) fn context_fn<TCtx, F>(
    f: impl Fn(RequestInfo) -> F + Send + Sync + 'static,
) -> ContextFn<TCtx>
where
    F: Future<Output = Result<TCtx, Error>> + Send + 'static,
{
    Arc::new(move |info| f(info).boxed())
}
