//! `status`: liveness and uptime.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use gate_core::{Action, ActionHandler, Connection, GateError, HttpMethod, Params};
use serde_json::{Value, json};

/// Reports that the process is up.
pub struct StatusAction {
    name: String,
    started: Instant,
}

impl StatusAction {
    /// Status for the process called `name`, counting uptime from now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl ActionHandler for StatusAction {
    async fn run(&self, _conn: &Connection, _params: Params) -> Result<Value, GateError> {
        Ok(json!({
            "status": "ok",
            "name": self.name,
            "timestamp": Utc::now().timestamp(),
            "uptimeSecs": self.started.elapsed().as_secs(),
        }))
    }
}

/// The `status` action, `GET /status`.
pub fn action(process_name: &str) -> Action {
    Action::new("status", StatusAction::new(process_name))
        .describe("Returns server status information")
        .web(HttpMethod::Get, "/status")
}
