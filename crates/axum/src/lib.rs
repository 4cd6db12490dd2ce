//! Serve a [`linkrpc::Router`] from an [Axum](https://docs.rs/axum/latest/axum/) server.
//!
//! ```rust,no_run
//! # use linkrpc::{Error, RequestInfo, Router};
//! let app: axum::Router = axum::Router::new().nest(
//!     "/rpc",
//!     linkrpc_axum::Endpoint::new(Router::<()>::new(), |_: RequestInfo| async {
//!         Ok::<_, Error>(())
//!     }),
//! );
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
#![allow(clippy::module_inception)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod endpoint;
#[cfg(feature = "ws")]
mod ws;

pub use endpoint::Endpoint;
