//! Layered settings loading.
//!
//! Compiled defaults, then `<dir>/config.json`, then `<dir>/config.<env>.json`,
//! then `ACTIONGATE_*` variables. File layers are merged with [`deep_merge`].

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::GateSettings;

/// Prefix of every override variable.
pub const ENV_PREFIX: &str = "ACTIONGATE_";

/// Variable naming the config directory.
pub const CONFIG_DIR_ENV: &str = "ACTIONGATE_CONFIG_DIR";

/// Variable naming the deployment environment (`production`, `test`, ...).
pub const ENVIRONMENT_ENV: &str = "ACTIONGATE_ENV";

/// Resolve the config directory: `ACTIONGATE_CONFIG_DIR`, else `./config`.
pub fn config_dir() -> PathBuf {
    read_env_string(CONFIG_DIR_ENV).map_or_else(|| PathBuf::from("config"), PathBuf::from)
}

/// Deployment environment from `ACTIONGATE_ENV`, if set.
pub fn environment() -> Option<String> {
    read_env_string(ENVIRONMENT_ENV)
}

/// Load settings from the default directory and environment.
pub fn load_settings() -> Result<GateSettings> {
    load_settings_from_dir(&config_dir(), environment().as_deref())
}

/// Load settings from `dir` with env var overrides.
///
/// Missing files are skipped. A file with invalid JSON is an error.
pub fn load_settings_from_dir(dir: &Path, env: Option<&str>) -> Result<GateSettings> {
    let mut merged = serde_json::to_value(GateSettings::default())?;

    merged = merge_file(merged, &dir.join("config.json"))?;
    if let Some(env) = env {
        merged = merge_file(merged, &dir.join(format!("config.{env}.json")))?;
    }

    let mut settings: GateSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn merge_file(base: Value, path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file");
        return Ok(base);
    }
    debug!(path = %path.display(), "merging settings file");
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let layer: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(deep_merge(base, layer))
}

/// Overlay `layer` onto `base`.
///
/// Objects merge key by key. Any other layer value replaces the base value,
/// except `null`, which leaves the base untouched.
pub fn deep_merge(base: Value, layer: Value) -> Value {
    match (base, layer) {
        (Value::Object(mut base), Value::Object(layer)) => {
            for (key, value) in layer.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, layer) => layer,
    }
}

/// Apply `ACTIONGATE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut GateSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_overrides(settings: &mut GateSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string("PROCESS_NAME") {
        settings.process.name = v;
    }
    if let Some(v) = env.string("LOGGER_LEVEL") {
        settings.logger.level = v;
    }
    if let Some(v) = env.bool("LOGGER_COLORIZE") {
        settings.logger.colorize = v;
    }
    if let Some(v) = env.bool("LOGGER_TIMESTAMP") {
        settings.logger.timestamp = v;
    }

    let web = &mut settings.server.web;
    if let Some(v) = env.bool("SERVER_WEB_ENABLED") {
        web.enabled = v;
    }
    if let Some(v) = env.string("SERVER_WEB_HOST") {
        web.host = v;
    }
    if let Some(v) = env.bounded("SERVER_WEB_PORT", 0..=u16::MAX) {
        web.port = v;
    }
    if let Some(v) = env.string("SERVER_WEB_API_ROUTE") {
        web.api_route = v;
    }
    if let Some(v) = env.string("SERVER_WEB_WS_ROUTE") {
        web.ws_route = v;
    }
    if let Some(v) = env.string("SERVER_WEB_ALLOWED_ORIGINS") {
        web.allowed_origins = v;
    }
    if let Some(v) = env.string("SERVER_WEB_ALLOWED_METHODS") {
        web.allowed_methods = v;
    }
    if let Some(v) = env.string("SERVER_WEB_ALLOWED_HEADERS") {
        web.allowed_headers = v;
    }
    if let Some(v) = env.bool("SERVER_WEB_STATIC_FILES_ENABLED") {
        web.static_files_enabled = v;
    }
    if let Some(v) = env.string("SERVER_WEB_STATIC_FILES_ROUTE") {
        web.static_files_route = v;
    }
    if let Some(v) = env.string("SERVER_WEB_STATIC_FILES_DIRECTORY") {
        web.static_files_directory = v;
    }
    if let Some(v) = env.bounded("SERVER_WEB_OUTBOUND_QUEUE_SIZE", 1..=1_000_000) {
        web.outbound_queue_size = v;
    }
    if let Some(v) = env.bounded("SERVER_WEB_BROADCAST_QUEUE_SIZE", 1..=1_000_000) {
        web.broadcast_queue_size = v;
    }
    if let Some(v) = env.bounded("SERVER_WEB_MAX_BODY_BYTES", 1024..=1 << 30) {
        web.max_body_bytes = v;
    }
    if let Some(v) = env.bounded("SERVER_WEB_ACTION_TIMEOUT_SECS", 1..=86_400) {
        web.action_timeout_secs = v;
    }
    if let Some(v) = env.bounded("SERVER_WEB_SHUTDOWN_GRACE_SECS", 0..=3_600) {
        web.shutdown_grace_secs = v;
    }
}

/// Boolean spellings accepted in variables, case-insensitive.
pub fn parse_flag(val: &str) -> Option<bool> {
    const TRUE: [&str; 4] = ["true", "1", "yes", "on"];
    const FALSE: [&str; 4] = ["false", "0", "no", "off"];
    let val = val.trim().to_ascii_lowercase();
    if TRUE.contains(&val.as_str()) {
        Some(true)
    } else if FALSE.contains(&val.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number and keep it only if it lies in `range`.
pub fn parse_bounded<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn raw(&self, suffix: &str) -> Option<(String, String)> {
        let key = format!("{ENV_PREFIX}{suffix}");
        (self.lookup)(&key).map(|v| (key, v))
    }

    fn string(&self, suffix: &str) -> Option<String> {
        self.raw(suffix).map(|(_, v)| v).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, suffix: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let (key, val) = self.raw(suffix)?;
        let parsed = parse(&val);
        if parsed.is_none() {
            warn!(%key, value = %val, "ignoring invalid override");
        }
        parsed
    }

    fn bool(&self, suffix: &str) -> Option<bool> {
        self.parsed(suffix, parse_flag)
    }

    fn bounded<T: FromStr + PartialOrd>(&self, suffix: &str, range: RangeInclusive<T>) -> Option<T> {
        self.parsed(suffix, |v| parse_bounded(v, range))
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
