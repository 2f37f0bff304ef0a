//! Subcommand bodies.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gate_actions::assemble_actions;
use gate_core::{
    ActionLookup, ActionRegistry, Connection, Dispatcher, GateError, Orchestrator, TransportKind,
};
use gate_server::Gateway;
use gate_settings::GateSettings;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::args::parse_action_args;

/// Method label recorded for local runs.
pub const CLI_METHOD: &str = "CLI";

/// Output form of `actiongate config`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// `key = value` lines with secrets masked.
    List,
    /// Pretty JSON.
    Json,
}

fn registry(settings: &GateSettings) -> Result<Arc<ActionRegistry>> {
    let registry = ActionRegistry::from_actions(assemble_actions(settings))
        .context("failed to register actions")?;
    Ok(Arc::new(registry))
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn start(settings: GateSettings) -> Result<()> {
    let metrics = gate_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;
    let actions = registry(&settings)?;
    info!(
        name = %settings.process.name,
        environment = gate_settings::environment().as_deref().unwrap_or("default"),
        actions = actions.len(),
        "starting"
    );

    let orchestrator = Orchestrator::new();
    let gateway = if settings.server.web.enabled {
        let lookup: Arc<dyn ActionLookup> = actions;
        let gateway = Arc::new(Gateway::new(settings.server.web.clone(), lookup).with_metrics(metrics));
        orchestrator.register_server(gateway.clone());
        Some(gateway)
    } else {
        warn!("web server disabled; nothing to serve");
        None
    };

    orchestrator.initialize().await.context("initialization failed")?;
    if let Err(err) = orchestrator.start().await {
        let _ = orchestrator.stop().await;
        return Err(err).context("startup failed");
    }
    if let Some(addr) = gateway.as_ref().and_then(|g| g.local_addr()) {
        info!(%addr, "actiongate listening");
    }

    shutdown_signal().await?;
    info!("shutting down");
    orchestrator.stop().await.context("shutdown failed")?;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")
}

/// Print the effective configuration.
pub fn print_config(settings: &GateSettings, format: ConfigFormat, out: &mut impl Write) -> Result<()> {
    match format {
        ConfigFormat::List => {
            for (key, value) in settings.masked_entries() {
                writeln!(out, "{key} = {value}")?;
            }
        }
        ConfigFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(settings)?)?;
        }
    }
    Ok(())
}

/// Print one block per registered action.
pub fn list_actions(settings: &GateSettings, out: &mut impl Write) -> Result<()> {
    for action in registry(settings)?.actions() {
        let summary = action.summary();
        match &summary.web {
            Some(web) => writeln!(out, "{} ({} {})", summary.name, web.method, web.route)?,
            None => writeln!(out, "{}", summary.name)?,
        }
        if !summary.description.is_empty() {
            writeln!(out, "    {}", summary.description)?;
        }
        for field in summary.inputs.fields() {
            let required = if field.required { " (required)" } else { "" };
            writeln!(out, "    --{} <{}>{required}", field.name, field.kind.as_str())?;
        }
    }
    Ok(())
}

/// `cli:<user>` from `$USER`.
pub fn cli_identifier() -> String {
    let user = std::env::var("USER").ok().filter(|u| !u.is_empty());
    format!("cli:{}", user.as_deref().unwrap_or("cli"))
}

/// Run one action through the dispatcher.
///
/// Only initializers run; no server is registered.
pub async fn execute_action(settings: &GateSettings, name: &str, args: &[String]) -> Result<Result<Value, GateError>> {
    let actions = registry(settings)?;
    let orchestrator = Orchestrator::new();
    orchestrator.initialize().await.context("initialization failed")?;

    let params = match actions.get(name) {
        Some(action) => match parse_action_args(action.inputs(), args) {
            Ok(params) => params,
            Err(err) => return Ok(Err(err)),
        },
        None => {
            return Ok(Err(GateError::ActionNotFound {
                name: name.to_owned(),
            }));
        }
    };

    let lookup: Arc<dyn ActionLookup> = actions;
    let dispatcher = Dispatcher::new(lookup)
        .with_default_timeout(Duration::from_secs(settings.server.web.action_timeout_secs));
    let conn = Connection::new(TransportKind::Cli, cli_identifier());
    Ok(dispatcher
        .dispatch(&conn, name, params, CLI_METHOD, "")
        .await
        .into_result())
}

/// Render the outcome of a local run. Returns `true` on success.
pub fn write_outcome(
    result: &Result<Value, GateError>,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> Result<bool> {
    match result {
        Ok(response) => {
            let body = json!({ "response": response });
            writeln!(stdout, "{}", serde_json::to_string_pretty(&body)?)?;
            Ok(true)
        }
        Err(err) => {
            let body = json!({ "error": err.to_error_body() });
            writeln!(stderr, "{}", serde_json::to_string_pretty(&body)?)?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    fn text(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn echo_runs_locally() {
        let settings = GateSettings::default();
        let result = execute_action(&settings, "echo", &args(&["--message", "hi"]))
            .await
            .unwrap();
        assert_eq!(result.unwrap(), json!({"received": {"message": "hi"}}));
    }

    #[tokio::test]
    async fn cli_values_are_coerced() {
        let settings = GateSettings::default();
        let result = execute_action(
            &settings,
            "user:create",
            &args(&["--name", "Ada", "--email", "ada@example.com", "--age", "36"]),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result["user"]["age"], 36);
    }

    #[tokio::test]
    async fn missing_required_input() {
        let settings = GateSettings::default();
        let result = execute_action(&settings, "user:create", &args(&["--name", "Ada"]))
            .await
            .unwrap();
        assert_matches!(result, Err(GateError::ParamRequired { ref key }) if key == "email");
    }

    #[tokio::test]
    async fn unknown_action_and_flag() {
        let settings = GateSettings::default();
        let missing = execute_action(&settings, "nope", &[]).await.unwrap();
        assert_matches!(missing, Err(GateError::ActionNotFound { .. }));

        let bad_flag = execute_action(&settings, "echo", &args(&["--bogus", "1"])).await.unwrap();
        assert_eq!(bad_flag.unwrap_err().code(), "INVALID_REQUEST");
    }

    #[test]
    fn outcome_goes_to_the_right_stream() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert!(write_outcome(&Ok(json!({"a": 1})), &mut out, &mut err).unwrap());
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, json!({"response": {"a": 1}}));
        assert!(err.is_empty());

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let failure = Err(GateError::ActionNotFound { name: "x".into() });
        assert!(!write_outcome(&failure, &mut out, &mut err).unwrap());
        assert!(out.is_empty());
        let parsed: Value = serde_json::from_slice(&err).unwrap();
        assert_eq!(parsed["error"]["code"], "ACTION_NOT_FOUND");
        assert!(parsed["error"]["message"].is_string());
    }

    #[test]
    fn config_list_prints_dotted_keys() {
        let mut out = Vec::new();
        print_config(&GateSettings::default(), ConfigFormat::List, &mut out).unwrap();
        let out = text(out);
        assert!(out.contains("process.name = actiongate"));
        assert!(out.contains("server.web.apiRoute = /api"));
    }

    #[test]
    fn config_json_round_trips() {
        let mut out = Vec::new();
        print_config(&GateSettings::default(), ConfigFormat::Json, &mut out).unwrap();
        let parsed: GateSettings = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.process.name, "actiongate");
    }

    #[test]
    fn actions_listing() {
        let mut out = Vec::new();
        list_actions(&GateSettings::default(), &mut out).unwrap();
        let out = text(out);
        assert!(out.contains("status (GET /status)"));
        assert!(out.contains("user:create (POST /users)"));
        assert!(out.contains("    --email <string> (required)"));
    }

    #[test]
    fn identifier_has_cli_prefix() {
        assert!(cli_identifier().starts_with("cli:"));
    }
}
