//! Action definitions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::connection::Connection;
use crate::errors::GateError;
use crate::middleware::Middleware;
use crate::schema::{InputField, InputSchema};
use crate::types::{HttpMethod, Params};

/// Trait implemented by every action body.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action for `conn` with already-validated `params`.
    async fn run(&self, conn: &Connection, params: Params) -> Result<Value, GateError>;
}

/// HTTP exposure of an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebBinding {
    /// Path pattern relative to the API prefix, `:name` marks a segment.
    pub route: String,
    /// Bound verb.
    pub method: HttpMethod,
}

/// Background-task metadata. Scheduling is not performed by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBinding {
    /// Queue name.
    pub queue: String,
    /// Repeat interval in milliseconds, 0 for one-shot.
    pub frequency_ms: u64,
}

/// A named unit of server logic.
///
/// Built once, handed to the registry, never mutated afterwards.
#[derive(Clone)]
pub struct Action {
    name: String,
    description: Option<String>,
    inputs: InputSchema,
    middleware: Vec<Arc<dyn Middleware>>,
    web: Option<WebBinding>,
    task: Option<TaskBinding>,
    timeout: Option<Duration>,
    handler: Arc<dyn ActionHandler>,
}

impl Action {
    /// Create an action with no bindings, inputs or middleware.
    pub fn new(name: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        Self {
            name: name.into(),
            description: None,
            inputs: InputSchema::empty(),
            middleware: Vec::new(),
            web: None,
            task: None,
            timeout: None,
            handler: Arc::new(handler),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare one input.
    #[must_use]
    pub fn input(mut self, field: InputField) -> Self {
        self.inputs = self.inputs.field(field);
        self
    }

    /// Append a middleware.
    #[must_use]
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Expose over HTTP.
    #[must_use]
    pub fn web(mut self, method: HttpMethod, route: impl Into<String>) -> Self {
        self.web = Some(WebBinding {
            route: route.into(),
            method,
        });
        self
    }

    /// Attach task metadata.
    #[must_use]
    pub fn task(mut self, queue: impl Into<String>, frequency_ms: u64) -> Self {
        self.task = Some(TaskBinding {
            queue: queue.into(),
            frequency_ms,
        });
        self
    }

    /// Override the dispatcher's default time budget.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Unique action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description, defaulting to `An Action: <name>`.
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("An Action: {}", self.name))
    }

    /// Declared inputs.
    pub fn inputs(&self) -> &InputSchema {
        &self.inputs
    }

    /// Middleware in declaration order.
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// HTTP binding, if any.
    pub fn web_binding(&self) -> Option<&WebBinding> {
        self.web.as_ref()
    }

    /// Task binding, if any.
    pub fn task_binding(&self) -> Option<&TaskBinding> {
        self.task.as_ref()
    }

    /// Per-action time budget, if overridden.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Invoke the body.
    pub async fn run(&self, conn: &Connection, params: Params) -> Result<Value, GateError> {
        self.handler.run(conn, params).await
    }

    /// Serializable description for listings.
    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            name: self.name.clone(),
            description: self.description(),
            web: self.web.clone(),
            task: self.task.clone(),
            inputs: self.inputs.clone(),
            middleware: self.middleware.iter().map(|m| m.name().to_owned()).collect(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("web", &self.web)
            .field("task", &self.task)
            .field("inputs", &self.inputs.fields().len())
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Listing entry for an action.
#[derive(Clone, Debug, Serialize)]
pub struct ActionSummary {
    /// Action name.
    pub name: String,
    /// Description.
    pub description: String,
    /// HTTP binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<WebBinding>,
    /// Task binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskBinding>,
    /// Declared inputs.
    pub inputs: InputSchema,
    /// Middleware names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
}
