//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON deserializes with the remaining fields at their defaults.

mod logger;
mod server;

pub use logger::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "process": { "name": "actiongate" },
///   "logger": { "level": "debug" },
///   "server": { "web": { "port": 9090 } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateSettings {
    /// Process identity.
    pub process: ProcessSettings,
    /// Logging.
    pub logger: LoggerSettings,
    /// Servers.
    pub server: ServerSettings,
}

/// Process identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessSettings {
    /// Name reported by `status` and in logs.
    pub name: String,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            name: "actiongate".to_string(),
        }
    }
}

/// Keys whose values are never printed.
const SECRET_MARKERS: [&str; 3] = ["password", "secret", "token"];

impl GateSettings {
    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        let web = &self.server.web;
        if web.outbound_queue_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.web.outboundQueueSize must be at least 1".into(),
            ));
        }
        if web.broadcast_queue_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.web.broadcastQueueSize must be at least 1".into(),
            ));
        }
        for (key, route) in [
            ("apiRoute", &web.api_route),
            ("wsRoute", &web.ws_route),
            ("staticFilesRoute", &web.static_files_route),
        ] {
            if !route.starts_with('/') {
                return Err(SettingsError::InvalidValue(format!(
                    "server.web.{key} must start with '/' (got {route:?})"
                )));
            }
        }
        Ok(())
    }

    /// Flatten to sorted `dotted.key = value` pairs with secrets masked.
    pub fn masked_entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(value) = serde_json::to_value(self) {
            flatten("", &value, &mut out);
        }
        out.sort();
        out
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        other => {
            let lower = prefix.to_lowercase();
            let rendered = match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            let shown = if SECRET_MARKERS.iter().any(|m| lower.contains(m)) {
                "*".repeat(rendered.chars().count())
            } else {
                rendered
            };
            out.push((prefix.to_owned(), shown));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_validate() {
        GateSettings::default().validate().unwrap();
    }

    #[test]
    fn zero_queue_rejected() {
        let mut settings = GateSettings::default();
        settings.server.web.broadcast_queue_size = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn relative_route_rejected() {
        let mut settings = GateSettings::default();
        settings.server.web.api_route = "api".into();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("apiRoute"));
    }

    #[test]
    fn masked_entries_flatten_and_mask() {
        let mut out = Vec::new();
        let value = serde_json::json!({
            "db": {"password": "hunter2", "host": "localhost"},
            "port": 5432
        });
        flatten("", &value, &mut out);
        out.sort();
        assert_eq!(
            out,
            vec![
                ("db.host".to_string(), "localhost".to_string()),
                ("db.password".to_string(), "*******".to_string()),
                ("port".to_string(), "5432".to_string()),
            ]
        );
    }

    #[test]
    fn masked_entries_cover_every_leaf() {
        let entries = GateSettings::default().masked_entries();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"process.name"));
        assert!(keys.contains(&"server.web.port"));
        assert!(keys.contains(&"logger.level"));
    }
}
