//! Settings type definitions.
//!
//! All types use camelCase JSON names and `#[serde(default)]`, so a
//! settings file only needs the keys it wants to change.

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabtraceSettings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub capture: CaptureSettings,
    pub collect: CollectSettings,
    pub logging: LoggingSettings,
}

/// WebSocket front door for the host bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket / health port.
    pub port: u16,
    /// Outbound frame queue per connected client.
    pub max_send_queue: usize,
    /// Seconds between dead-client sweeps.
    pub client_cleanup_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            max_send_queue: 256,
            client_cleanup_interval_secs: 60,
        }
    }
}

/// Durable mirror and expiry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Database file, relative to `~/.tabtrace` unless absolute.
    pub db_path: String,
    /// Rows older than this are removed by the periodic sweep.
    pub expiry_secs: u64,
    /// Interval of the periodic sweep.
    pub sweep_interval_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "tabtrace.db".to_string(),
            expiry_secs: 3_600,
            sweep_interval_secs: 1_800,
        }
    }
}

/// Network capture behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    /// Distinct URLs kept per tab generation.
    pub max_urls_per_tab: usize,
    /// URL prefixes whose navigations are never observed.
    pub ignored_schemes: Vec<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_urls_per_tab: 200,
            ignored_schemes: [
                "about:",
                "chrome:",
                "chrome-extension:",
                "moz-extension:",
                "edge:",
                "opera:",
                "vivaldi:",
                "brave:",
                "file:",
                "data:",
                "javascript:",
                "view-source:",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

/// Snapshot polling and badge rendering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectSettings {
    /// Delay between polls while the page has not finished loading.
    pub retry_delay_ms: u64,
    /// Polls before giving up on a page that never finishes.
    pub max_attempts: u32,
    /// Use the 3-character badge budget.
    pub compact_badge: bool,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            retry_delay_ms: 100,
            max_attempts: 300,
            compact_badge: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module overrides, e.g. `{"tabtrace_engine": "debug"}`.
    pub modules: std::collections::BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            modules: std::collections::BTreeMap::new(),
        }
    }
}
