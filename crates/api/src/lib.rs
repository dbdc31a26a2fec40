//! HTTP API: routing, request context and JSON mapping over the TradeFlow
//! domain and infrastructure crates.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
