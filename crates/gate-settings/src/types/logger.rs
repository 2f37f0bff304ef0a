//! Logging settings.

use serde::{Deserialize, Serialize};

/// How the process logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Human-readable coloured text; JSON lines when off.
    pub colorize: bool,
    /// Include timestamps.
    pub timestamp: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            colorize: true,
            timestamp: true,
        }
    }
}
