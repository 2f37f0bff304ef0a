//! # gate-settings
//!
//! Layered configuration for the gateway.
//!
//! Settings are loaded from four layers (in priority order):
//! 1. **Compiled defaults**: [`GateSettings::default()`]
//! 2. **Base file**: `<config dir>/config.json`
//! 3. **Environment file**: `<config dir>/config.<ACTIONGATE_ENV>.json`
//! 4. **Environment variables**: `ACTIONGATE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{config_dir, deep_merge, environment, load_settings, load_settings_from_dir};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = GateSettings::default();
        assert_eq!(settings.process.name, "actiongate");
        assert_eq!(settings.logger.level, "info");
        assert!(settings.logger.timestamp);
        assert_eq!(settings.server.web.host, "0.0.0.0");
        assert_eq!(settings.server.web.allowed_methods, "GET,POST,PUT,DELETE,PATCH,OPTIONS");
        assert_eq!(settings.server.web.allowed_headers, "Content-Type,Authorization");
        assert_eq!(settings.server.web.static_files_route, "/public");
        assert_eq!(settings.server.web.shutdown_grace_secs, 10);
    }

    #[test]
    fn settings_serialize_camel_case() {
        let v = serde_json::to_value(GateSettings::default()).unwrap();
        assert_eq!(v["server"]["web"]["apiRoute"], "/api");
        assert_eq!(v["server"]["web"]["staticFilesEnabled"], false);
    }
}
