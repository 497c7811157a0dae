//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HyphaSettings::default()`]
//! 2. If `~/.hypha/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::HyphaSettings;

/// Resolve the path to the settings file (`~/.hypha/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hypha").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HyphaSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<HyphaSettings> {
    let mut merged =
        serde_json::to_value(HyphaSettings::default()).map_err(SettingsError::Defaults)?;
    let parse_err = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };

    if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_err)?;
        deep_merge(&mut merged, user);
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let mut settings: HyphaSettings = serde_json::from_value(merged).map_err(parse_err)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Overlay `source` onto `target` in place.
///
/// Nested objects merge key by key. Any other value in `source` replaces
/// the target value outright, except `null`, which leaves it untouched.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut HyphaSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse or fall
/// outside their range are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut HyphaSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("HYPHA_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("HYPHA_PORT") {
        match parse_in_range::<u16>(&v, 1..=u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "HYPHA_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("HYPHA_HEARTBEAT_INTERVAL") {
        match parse_in_range(&v, 1..=3600_u64) {
            Some(secs) => settings.server.heartbeat_interval_secs = secs,
            None => {
                warn!(key = "HYPHA_HEARTBEAT_INTERVAL", value = %v, "invalid interval env var, ignoring");
            }
        }
    }
    if let Some(v) = read("HYPHA_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("HYPHA_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "HYPHA_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = read("HYPHA_REDIS_URL") {
        settings.rate_limit.redis_url = Some(v);
    }
    if let Some(v) = read("JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }
}

/// Interpret a switch-style value such as `yes`, `OFF` or `1`.
pub fn parse_bool(val: &str) -> Option<bool> {
    const ON: [&str; 4] = ["true", "1", "yes", "on"];
    const OFF: [&str; 4] = ["false", "0", "no", "off"];
    let val = val.trim();
    if ON.iter().any(|s| s.eq_ignore_ascii_case(val)) {
        Some(true)
    } else if OFF.iter().any(|s| s.eq_ignore_ascii_case(val)) {
        Some(false)
    } else {
        None
    }
}

/// Parse an integer and keep it only if it lies in `bounds`.
pub fn parse_in_range<T>(val: &str, bounds: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| bounds.contains(n))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn nested_objects_merge_per_key() {
        let mut doc = json!({"rateLimit": {"windowSecs": 60, "fallbackLimit": 60}});
        deep_merge(&mut doc, json!({"rateLimit": {"windowSecs": 10}}));
        assert_eq!(doc["rateLimit"]["windowSecs"], 10);
        assert_eq!(doc["rateLimit"]["fallbackLimit"], 60);
    }

    #[test]
    fn null_never_clears_a_value() {
        let mut doc = json!({"auth": {"jwtSecret": "s"}});
        deep_merge(&mut doc, json!({"auth": {"jwtSecret": null, "extra": null}}));
        assert_eq!(doc, json!({"auth": {"jwtSecret": "s"}}));
    }

    #[test]
    fn scalars_and_arrays_replace() {
        let mut doc = json!({"tags": [1, 2, 3], "server": {"port": 8000}});
        deep_merge(&mut doc, json!({"tags": [4], "server": "flat"}));
        assert_eq!(doc["tags"], json!([4]));
        assert_eq!(doc["server"], "flat");
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, HyphaSettings::default().server.port);
    }

    #[test]
    fn load_partial_json_merges_limit_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"rateLimit": {"methodLimits": {"GET": 10}, "endpointLimits": {"/api/x": 3}}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.rate_limit.method_limits["GET"], 10);
        assert_eq!(settings.rate_limit.method_limits["POST"], 60);
        assert_eq!(settings.rate_limit.endpoint_limits["/api/x"], 3);
        assert_eq!(settings.rate_limit.endpoint_limits["/api/chain/execute"], 30);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Parse { .. }));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_valid_values() {
        let mut settings = HyphaSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("HYPHA_HOST", "127.0.0.1"),
                ("HYPHA_PORT", "9100"),
                ("HYPHA_HEARTBEAT_INTERVAL", "5"),
                ("HYPHA_LOG_JSON", "yes"),
                ("JWT_SECRET", "s3cret"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.heartbeat_interval_secs, 5);
        assert!(settings.logging.json);
        assert_eq!(settings.auth.jwt_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut settings = HyphaSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("HYPHA_PORT", "99999"),
                ("HYPHA_HEARTBEAT_INTERVAL", "0"),
                ("HYPHA_LOG_JSON", "maybe"),
                ("HYPHA_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.heartbeat_interval_secs, 30);
        assert!(!settings.logging.json);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
    }

    #[test]
    fn parse_in_range_bounds() {
        assert_eq!(parse_in_range("1", 1..=10_u64), Some(1));
        assert_eq!(parse_in_range(" 10 ", 1..=10_u64), Some(10));
        assert_eq!(parse_in_range("11", 1..=10_u64), None);
        assert_eq!(parse_in_range("-1", 1..=10_u64), None);
        assert_eq!(parse_in_range::<u16>("70000", 1..=u16::MAX), None);
    }
}
