//! Client for [`linkrpc`] servers.
//!
//! Calls travel as [`Operation`]s through a [`Chain`] of [`Link`]s. Links can cache, deduplicate,
//! retry, time out, log or route an operation before a terminating link ([`HttpLink`],
//! [`HttpBatchLink`] or [`WsLink`]) puts it on the wire.
//!
//! ```rust,no_run
//! # #[cfg(feature = "reqwest")]
//! # async fn demo() -> Result<(), linkrpc_client::ClientError> {
//! use linkrpc_client::*;
//!
//! let client: Client = Client::new(
//!     Chain::new()
//!         .link(LoggerLink)
//!         .link(RetryLink::default())
//!         .link(HttpBatchLink::new("http://localhost:4000/rpc", ReqwestFetch::new()?)),
//! );
//!
//! let greeting: String = client.query("greet", "world").await?;
//! # Ok(())
//! # }
//! ```
#![warn(
    clippy::all,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::panic,
    clippy::todo,
    clippy::panic_in_result_fn,
    // missing_docs
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod client;
mod error;
mod fetch;
mod link;
mod links;
mod operation;

pub use client::{Client, OperationBuilder, Procedure};
pub use error::ClientError;
pub use fetch::{Fetch, FetchRequest, FetchResponse};
#[cfg(feature = "reqwest")]
pub use fetch::ReqwestFetch;
pub use link::{execute_link_chain, Chain, Link, LinkOutput, LinkResult, Next};
pub use links::*;
pub use operation::Operation;
