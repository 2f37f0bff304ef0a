//! The single funnel every transport uses to run an action.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{info, warn};

use crate::action::Action;
use crate::connection::Connection;
use crate::errors::GateError;
use crate::registry::ActionLookup;
use crate::types::Params;

/// Log target of the per-dispatch line.
pub const ACTION_LOG_TARGET: &str = "actiongate::action";

/// Default time budget for one action.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of one dispatch plus the metadata that was logged for it.
#[derive(Debug)]
pub struct ActionOutcome {
    /// Resolved action name, or `unknown` if the lookup failed.
    pub action: String,
    /// Response value or error.
    pub response: Result<Value, GateError>,
    /// Wall time from lookup to final middleware.
    pub elapsed: Duration,
    /// Transport method label (`GET`, `WEBSOCKET`, `CLI`, ...).
    pub method: String,
    /// Transport locator (URL path, upgrade route, or empty).
    pub locator: String,
}

impl ActionOutcome {
    /// `OK` or `ERROR`.
    pub fn status_label(&self) -> &'static str {
        if self.response.is_ok() { "OK" } else { "ERROR" }
    }

    /// Drop the metadata.
    pub fn into_result(self) -> Result<Value, GateError> {
        self.response
    }
}

/// Looks up, validates, runs, times and logs actions.
pub struct Dispatcher {
    actions: Arc<dyn ActionLookup>,
    default_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over `actions` with the default time budget.
    pub fn new(actions: Arc<dyn ActionLookup>) -> Self {
        Self {
            actions,
            default_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// Replace the default time budget.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The action table this dispatcher reads from.
    pub fn actions(&self) -> &Arc<dyn ActionLookup> {
        &self.actions
    }

    /// Run `action_name` for `conn`.
    ///
    /// Emits exactly one log line per call, whatever the outcome.
    pub async fn dispatch(
        &self,
        conn: &Connection,
        action_name: &str,
        params: Params,
        method: &str,
        locator: &str,
    ) -> ActionOutcome {
        let start = Instant::now();
        let params_json = serde_json::to_string(&params).unwrap_or_else(|_| "{}".to_owned());

        let (label, response) = match self.actions.get(action_name) {
            Some(action) => {
                let name = action.name().to_owned();
                (name, self.execute(&action, conn, params).await)
            }
            None => (
                "unknown".to_owned(),
                Err(GateError::ActionNotFound {
                    name: action_name.to_owned(),
                }),
            ),
        };

        let elapsed = start.elapsed();
        let outcome = ActionOutcome {
            action: label,
            response,
            elapsed,
            method: method.to_owned(),
            locator: locator.to_owned(),
        };
        record(&outcome, conn, &params_json);
        outcome
    }

    async fn execute(
        &self,
        action: &Action,
        conn: &Connection,
        params: Params,
    ) -> Result<Value, GateError> {
        let budget = action.timeout_override().unwrap_or(self.default_timeout);
        let guarded = AssertUnwindSafe(run_pipeline(action, conn, params)).catch_unwind();

        match tokio::time::timeout(budget, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(GateError::internal(format!(
                "action '{}' panicked",
                action.name()
            ))),
            Err(_elapsed) => Err(GateError::Timeout {
                name: action.name().to_owned(),
                secs: budget.as_secs(),
            }),
        }
    }
}

async fn run_pipeline(action: &Action, conn: &Connection, params: Params) -> Result<Value, GateError> {
    let mut params = action.inputs().validate(params)?;

    for middleware in action.middleware() {
        if let Some(replaced) = middleware.before(conn, &params).await? {
            params = replaced;
        }
    }

    let mut response = action.run(conn, params).await?;

    for middleware in action.middleware().iter().rev() {
        if let Some(replaced) = middleware.after(conn, &response).await? {
            response = replaced;
        }
    }
    Ok(response)
}

fn record(outcome: &ActionOutcome, conn: &Connection, params_json: &str) {
    let action = outcome.action.as_str();
    let duration_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX);

    counter!("action_requests_total", "action" => action.to_owned()).increment(1);
    histogram!("action_duration_seconds", "action" => action.to_owned())
        .record(outcome.elapsed.as_secs_f64());

    match &outcome.response {
        Ok(_) => info!(
            target: ACTION_LOG_TARGET,
            status = "OK",
            action,
            duration_ms,
            method = %outcome.method,
            identifier = %conn.identifier,
            connection_id = %conn.id,
            locator = %outcome.locator,
            params = params_json,
            "[ACTION:OK] {action} ({duration_ms}ms)"
        ),
        Err(err) => {
            counter!(
                "action_errors_total",
                "action" => action.to_owned(),
                "code" => err.code().to_owned()
            )
            .increment(1);
            warn!(
                target: ACTION_LOG_TARGET,
                status = "ERROR",
                action,
                duration_ms,
                method = %outcome.method,
                identifier = %conn.identifier,
                connection_id = %conn.id,
                locator = %outcome.locator,
                params = params_json,
                error = %err,
                "[ACTION:ERROR] {action} ({duration_ms}ms)"
            );
        }
    }
}
