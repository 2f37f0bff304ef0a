//! Hooks that wrap an action's execution.

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::Connection;
use crate::errors::GateError;
use crate::types::Params;

/// Runs around an action.
///
/// `before` hooks run in declaration order and may replace the params or
/// reject the call. `after` hooks run in reverse order and may replace the
/// response.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name shown in listings and logs.
    fn name(&self) -> &str;

    /// Called before the action. `Ok(Some(p))` replaces the params.
    async fn before(&self, _conn: &Connection, _params: &Params) -> Result<Option<Params>, GateError> {
        Ok(None)
    }

    /// Called after a successful action. `Ok(Some(v))` replaces the response.
    async fn after(&self, _conn: &Connection, _response: &Value) -> Result<Option<Value>, GateError> {
        Ok(None)
    }
}
