//! Multiplexed WebSocket transport. Queries, mutations and subscriptions share one socket and
//! are correlated by request id.

mod connection;
pub mod jsonrpc;

pub use connection::{Connection, WsHandler};
