//! # gate-logging
//!
//! Structured logging with `tracing`.
//!
//! The process installs one global subscriber at startup. `RUST_LOG` takes
//! precedence over the configured level when it is set. Output goes to stderr
//! so command results on stdout stay machine-readable.

#![deny(unsafe_code)]

pub mod types;

pub use types::{LogFormat, LogLevel};

use gate_settings::LoggerSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Effective logging options after command-line flags are applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum level.
    pub level: LogLevel,
    /// Text when `true`, JSON otherwise.
    pub colorize: bool,
    /// Include timestamps.
    pub timestamp: bool,
    /// Only errors.
    pub quiet: bool,
}

impl LogConfig {
    /// Start from the settings file values.
    pub fn from_settings(settings: &LoggerSettings) -> Self {
        Self {
            level: LogLevel::from_str_lossy(&settings.level),
            colorize: settings.colorize,
            timestamp: settings.timestamp,
            quiet: false,
        }
    }

    /// Output encoding implied by `colorize`.
    pub fn format(&self) -> LogFormat {
        if self.colorize { LogFormat::Text } else { LogFormat::Json }
    }

    /// Filter directive used when `RUST_LOG` is absent.
    pub fn directive(&self) -> String {
        if self.quiet {
            LogLevel::Error.to_string()
        } else {
            self.level.to_string()
        }
    }
}

/// Failure to install the global subscriber.
#[derive(Debug, thiserror::Error)]
#[error("failed to install log subscriber: {0}")]
pub struct LoggingError(#[from] TryInitError);

/// Install the global subscriber.
pub fn init_subscriber(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = if config.quiet {
        EnvFilter::new(config.directive())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()))
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format(), config.timestamp) {
        (LogFormat::Text, true) => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .boxed(),
        (LogFormat::Text, false) => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .without_time()
            .boxed(),
        (LogFormat::Json, true) => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        (LogFormat::Json, false) => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .without_time()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_settings() {
        let settings = LoggerSettings {
            level: "debug".into(),
            colorize: false,
            timestamp: false,
        };
        let config = LogConfig::from_settings(&settings);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format(), LogFormat::Json);
        assert!(!config.timestamp);
        assert_eq!(config.directive(), "debug");
    }

    #[test]
    fn quiet_forces_error() {
        let mut config = LogConfig::from_settings(&LoggerSettings::default());
        assert_eq!(config.format(), LogFormat::Text);
        config.quiet = true;
        assert_eq!(config.directive(), "error");
    }

    #[test]
    fn second_install_fails() {
        let config = LogConfig::from_settings(&LoggerSettings::default());
        let _ = init_subscriber(&config);
        assert!(init_subscriber(&config).is_err());
    }
}
