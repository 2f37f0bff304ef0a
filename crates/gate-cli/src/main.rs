//! # actiongate
//!
//! Command-line entry point: serve the gateway, print configuration, list
//! actions, or run a single action locally.

#![deny(unsafe_code)]

mod args;
mod commands;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gate_logging::LogConfig;
use gate_settings::GateSettings;

use crate::commands::ConfigFormat;

/// Action gateway.
#[derive(Parser, Debug)]
#[command(name = "actiongate", about = "Action gateway over HTTP, WebSocket and CLI", version)]
struct Cli {
    /// Directory holding `config.json` (defaults to `ACTIONGATE_CONFIG_DIR` or `./config`).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Plain JSON log lines instead of colored text.
    #[arg(long, global = true)]
    no_color: bool,

    /// Omit timestamps from log lines.
    #[arg(long, global = true)]
    no_timestamp: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the servers and wait for a shutdown signal.
    Start,
    /// Print the effective configuration.
    Config {
        /// Output format.
        #[arg(long, value_enum, default_value = "list")]
        format: ConfigFormat,
    },
    /// List registered actions.
    Actions,
    /// Run an action: `actiongate <action> [--field value]...`.
    #[command(external_subcommand)]
    Run(Vec<String>),
}

impl Cli {
    fn load_settings(&self) -> Result<GateSettings> {
        let dir = self.config_dir.clone().unwrap_or_else(gate_settings::config_dir);
        gate_settings::load_settings_from_dir(&dir, gate_settings::environment().as_deref())
            .with_context(|| format!("failed to load settings from {}", dir.display()))
    }

    fn log_config(&self, settings: &GateSettings) -> LogConfig {
        let mut config = LogConfig::from_settings(&settings.logger);
        if self.no_color {
            config.colorize = false;
        }
        if self.no_timestamp {
            config.timestamp = false;
        }
        config.quiet = self.quiet;
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    gate_logging::init_subscriber(&cli.log_config(&settings))?;

    match cli.command {
        Command::Start => {
            commands::start(settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { format } => {
            commands::print_config(&settings, format, &mut io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Actions => {
            commands::list_actions(&settings, &mut io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(argv) => {
            let Some((name, rest)) = argv.split_first() else {
                anyhow::bail!("missing action name");
            };
            let result = commands::execute_action(&settings, name, rest).await?;
            let ok = commands::write_outcome(&result, &mut io::stdout().lock(), &mut io::stderr().lock())?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::ffi::OsString;

    #[test]
    fn global_flags_before_subcommand() {
        let cli = Cli::try_parse_from(["actiongate", "--no-color", "-q", "config", "--format", "json"]).unwrap();
        assert!(cli.no_color);
        assert!(cli.quiet);
        assert_matches!(cli.command, Command::Config { format: ConfigFormat::Json });
    }

    #[test]
    fn unknown_subcommand_runs_an_action() {
        let cli = Cli::try_parse_from(["actiongate", "echo", "--message", "hi"]).unwrap();
        assert_matches!(cli.command, Command::Run(ref argv) if argv == &["echo", "--message", "hi"]);
    }

    #[test]
    fn flags_override_logger_settings() {
        let cli = Cli::try_parse_from(["actiongate", "--no-timestamp", "start"]).unwrap();
        let config = cli.log_config(&GateSettings::default());
        assert!(!config.timestamp);
        assert!(config.colorize);
        assert!(!config.quiet);
    }

    #[test]
    fn config_dir_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"process":{"name":"from-file"}}"#).unwrap();
        let argv: Vec<OsString> = vec![
            "actiongate".into(),
            "--config-dir".into(),
            dir.path().into(),
            "actions".into(),
        ];
        let cli = Cli::try_parse_from(argv).unwrap();
        assert_eq!(cli.load_settings().unwrap().process.name, "from-file");
    }
}
