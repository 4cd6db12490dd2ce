//! linkrpc: typed procedures over HTTP and WebSockets.
//!
//! Define procedures with [`Procedure::builder`], mount them on a [`Router`] and serve the router
//! with [`http::HttpHandler`] and [`ws::WsHandler`] (or the `linkrpc-axum` integration). The
//! `linkrpc-client` crate is the other end of the wire.
//!
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

mod caller;
mod cors;
mod dispatch;
mod envelope;
mod error;
mod procedure_kind;
mod request;
mod router;

pub mod http;
pub mod middleware;
pub mod observable;
pub mod procedure;
pub mod transformer;
pub mod ws;

pub use caller::Caller;
pub use cors::{AllowOrigin, CorsOptions};
pub use dispatch::call_procedure;
pub use envelope::{ErrorData, ErrorShape, ResponseEnvelope, ResultData};
pub use error::{Error, ErrorCode};
pub use observable::{observable, Observable, Observer, Subscriber, Subscription, Teardown};
pub use procedure::{Procedure, ProcedureBuilder, ProcedureMeta, ProcedureOutput};
pub use procedure_kind::ProcedureKind;
pub use request::RequestInfo;
pub use router::{Router, RouterEntry};
pub use transformer::{CombinedTransformer, DataTransformer, IdentityTransformer};
