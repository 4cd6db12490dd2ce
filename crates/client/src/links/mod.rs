//! The built-in links.
//!
//! [`HttpLink`], [`HttpBatchLink`] and [`WsLink`] terminate a chain, the rest intercept
//! operations on their way to one of them.

mod cache;
mod dedupe;
mod http;
mod http_batch;
mod logger;
mod retry;
mod split;
mod timeout;
mod ws;

pub use cache::{CacheLink, CacheLinkOptions};
pub use dedupe::DedupeLink;
pub use http::HttpLink;
pub use http_batch::{HttpBatchLink, HttpBatchLinkOptions};
pub use logger::LoggerLink;
pub use retry::{RetryLink, RetryLinkOptions};
pub use split::SplitLink;
pub use timeout::{TimeoutLink, TimeoutLinkOptions};
pub use ws::{WsChannel, WsConnector, WsLink};
