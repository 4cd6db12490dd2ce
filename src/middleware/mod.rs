//! Middleware that wraps procedure execution.

#[cfg(feature = "tracing")]
mod audit_log;
mod middleware;
mod next;
mod rate_limit;

#[cfg(feature = "tracing")]
#[cfg_attr(docsrs, doc(cfg(feature = "tracing")))]
pub use audit_log::audit_log;
pub use middleware::{Middleware, MiddlewareOutput, MiddlewareResult};
pub(crate) use next::Chain;
pub use next::Next;
pub use rate_limit::{rate_limit, RateLimitOptions};
