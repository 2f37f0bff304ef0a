//! Gateway server settings.

use serde::{Deserialize, Serialize};

/// Container for all server kinds.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// HTTP + WebSocket gateway.
    pub web: WebSettings,
}

/// HTTP + WebSocket gateway settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSettings {
    /// Whether the gateway is registered at all.
    pub enabled: bool,
    /// Bind address.
    pub host: String,
    /// Bind port (0 for auto-assign).
    pub port: u16,
    /// Prefix under which action routes are served.
    pub api_route: String,
    /// WebSocket upgrade path.
    pub ws_route: String,
    /// `Access-Control-Allow-Origin` value.
    pub allowed_origins: String,
    /// `Access-Control-Allow-Methods` value.
    pub allowed_methods: String,
    /// `Access-Control-Allow-Headers` value.
    pub allowed_headers: String,
    /// Serve files from `static_files_directory`.
    pub static_files_enabled: bool,
    /// Mount point for static files.
    pub static_files_route: String,
    /// Directory served under `static_files_route`.
    pub static_files_directory: String,
    /// Per-connection outbound queue capacity.
    pub outbound_queue_size: usize,
    /// Shared broadcast queue capacity.
    pub broadcast_queue_size: usize,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Default time budget for one action.
    pub action_timeout_secs: u64,
    /// How long `stop` waits for the listener to drain.
    pub shutdown_grace_secs: u64,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_route: "/api".to_string(),
            ws_route: "/ws".to_string(),
            allowed_origins: "*".to_string(),
            allowed_methods: "GET,POST,PUT,DELETE,PATCH,OPTIONS".to_string(),
            allowed_headers: "Content-Type,Authorization".to_string(),
            static_files_enabled: false,
            static_files_route: "/public".to_string(),
            static_files_directory: "./public".to_string(),
            outbound_queue_size: 256,
            broadcast_queue_size: 256,
            max_body_bytes: 1_048_576,
            action_timeout_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

impl WebSettings {
    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let web = WebSettings::default();
        assert!(web.enabled);
        assert_eq!(web.port, 8080);
        assert_eq!(web.api_route, "/api");
        assert_eq!(web.outbound_queue_size, 256);
        assert_eq!(web.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let web: WebSettings =
            serde_json::from_str(r#"{"port": 9000, "staticFilesEnabled": true}"#).unwrap();
        assert_eq!(web.port, 9000);
        assert!(web.static_files_enabled);
        assert_eq!(web.host, "0.0.0.0");
    }
}
