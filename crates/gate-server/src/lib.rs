//! # gate-server
//!
//! Axum HTTP + `WebSocket` gateway over the action dispatcher.
//!
//! - HTTP: `:name` route patterns under the API prefix, JSON/form parsing,
//!   uniform success/error envelopes, CORS, static files, `/metrics`
//! - `WebSocket`: per-connection read/write workers, action calls, channel
//!   subscriptions
//! - Broadcasting: one bounded queue fanned out to subscribers, counting drops
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod cors;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use errors::ServerError;
pub use router::{CompiledPattern, RouteMatch, RouteTable};
pub use server::Gateway;
pub use websocket::broadcast::BroadcastEngine;
pub use websocket::manager::ConnectionManager;
