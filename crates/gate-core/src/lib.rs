//! # gate-core
//!
//! Transport-neutral pieces of the gateway:
//! - Actions, their declared inputs and middleware
//! - Connections with subscription and session state
//! - The action registry and the dispatcher every transport funnels through
//! - The lifecycle orchestrator for initializers and servers
//! - Error types with stable wire codes

#![deny(unsafe_code)]

pub mod action;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod lifecycle;
pub mod middleware;
pub mod publish;
pub mod registry;
pub mod schema;
pub mod types;

pub use action::{Action, ActionHandler, ActionSummary, TaskBinding, WebBinding};
pub use connection::{Connection, SessionData};
pub use dispatcher::{ActionOutcome, Dispatcher};
pub use errors::{ErrorBody, GateError, LifecycleError};
pub use lifecycle::{Initializer, LifecycleContext, Orchestrator, Server};
pub use middleware::Middleware;
pub use publish::Publisher;
pub use registry::{ActionLookup, ActionRegistry};
pub use schema::{FieldKind, InputField, InputSchema};
pub use types::{HttpMethod, Params, TransportKind};
