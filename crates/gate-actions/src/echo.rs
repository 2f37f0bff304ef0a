//! `echo`: returns its params.

use async_trait::async_trait;
use gate_core::{Action, ActionHandler, Connection, GateError, HttpMethod, InputField, Params};
use serde_json::{Value, json};

/// Echoes the params back.
pub struct EchoAction;

#[async_trait]
impl ActionHandler for EchoAction {
    async fn run(&self, _conn: &Connection, params: Params) -> Result<Value, GateError> {
        Ok(json!({ "received": params }))
    }
}

/// The `echo` action, `GET /echo/:message`.
pub fn action() -> Action {
    Action::new("echo", EchoAction)
        .describe("Echoes back the parameters sent to it")
        .input(InputField::string("message").describe("Text to echo"))
        .web(HttpMethod::Get, "/echo/:message")
}
