//! Configuration loading with deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientConfig::default()`]
//! 2. If `~/.murmur/settings.json` exists, deep-merge user values over
//!    defaults
//! 3. Apply `MURMUR_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Default server base URL.
const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Default fixed reconnect delay in milliseconds.
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file or merged value is not valid JSON for the schema.
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL, e.g. `https://chat.example.com/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Fixed delay between a retriable stream failure and the next
    /// connection attempt, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Resolve the path to the settings file (`~/.murmur/settings.json`).
#[must_use]
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".murmur").join("settings.json")
}

/// Load configuration from the default path with env var overrides.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(&config_path())
}

/// Load configuration from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_config_from_path(path: &Path) -> Result<ClientConfig, ConfigError> {
    let defaults = serde_json::to_value(ClientConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut config: ClientConfig = serde_json::from_value(merged)?;
    apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
#[must_use]
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

/// Apply environment overrides through an injectable lookup (tests pass a
/// closure; production passes `std::env::var`).
fn apply_overrides<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base_url) = lookup("MURMUR_BASE_URL") {
        config.base_url = base_url;
    }
    if let Some(delay) = lookup("MURMUR_RECONNECT_DELAY_MS") {
        if let Ok(delay) = delay.parse() {
            config.reconnect_delay_ms = delay;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
