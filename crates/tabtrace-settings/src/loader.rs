//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TabtraceSettings::default()`]
//! 2. If `~/.tabtrace/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TABTRACE_*` environment variable overrides (highest priority)
//! 4. Validate cross-field constraints

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::TabtraceSettings;

/// Root directory for settings and the default database location.
pub fn tabtrace_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tabtrace")
}

/// Resolve the path to the settings file (`~/.tabtrace/settings.json`).
pub fn settings_path() -> PathBuf {
    tabtrace_home().join("settings.json")
}

/// Resolve the configured database path against `~/.tabtrace`.
pub fn resolve_db_path(settings: &TabtraceSettings) -> PathBuf {
    let configured = Path::new(&settings.storage.db_path);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        tabtrace_home().join(configured)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TabtraceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TabtraceSettings> {
    let defaults = serde_json::to_value(TabtraceSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TabtraceSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings that would make the service misbehave.
pub fn validate(settings: &TabtraceSettings) -> Result<()> {
    if settings.storage.sweep_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "storage.sweepIntervalSecs must be positive".into(),
        ));
    }
    if settings.collect.max_attempts == 0 {
        return Err(SettingsError::InvalidValue(
            "collect.maxAttempts must be positive".into(),
        ));
    }
    if settings.capture.max_urls_per_tab == 0 {
        return Err(SettingsError::InvalidValue(
            "capture.maxUrlsPerTab must be positive".into(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut TabtraceSettings) {
    if let Some(v) = read_env_string("TABTRACE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("TABTRACE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("TABTRACE_DB_PATH") {
        settings.storage.db_path = v;
    }
    if let Some(v) = read_env_u64("TABTRACE_EXPIRY_SECS", 60, 30 * 86_400) {
        settings.storage.expiry_secs = v;
    }
    if let Some(v) = read_env_u64("TABTRACE_SWEEP_INTERVAL_SECS", 1, 86_400) {
        settings.storage.sweep_interval_secs = v;
    }
    if let Some(v) = read_env_usize("TABTRACE_MAX_URLS_PER_TAB", 1, 100_000) {
        settings.capture.max_urls_per_tab = v;
    }
    if let Some(v) = read_env_u64("TABTRACE_COLLECT_MAX_ATTEMPTS", 1, 100_000) {
        settings.collect.max_attempts = u32::try_from(v).unwrap_or(u32::MAX);
    }
    if let Some(v) = read_env_bool("TABTRACE_COMPACT_BADGE") {
        settings.collect.compact_badge = v;
    }
    if let Some(v) = read_env_string("TABTRACE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("TABTRACE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
