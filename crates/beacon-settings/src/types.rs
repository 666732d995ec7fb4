//! Typed settings tree.
//!
//! Every field has a compiled default so that partial files and single
//! environment overrides deserialize cleanly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener and session transport settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Listener and session transport settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks an ephemeral port.
    pub port: u16,
    /// Seconds between keepalive pings on each open stream.
    pub keepalive_interval_secs: u64,
    /// Outbound frames buffered per session, on top of the handshake, before
    /// sends fail.
    pub channel_capacity: usize,
    /// Largest accepted POST body.
    pub max_body_bytes: usize,
    /// Name reported in `hello`, `initialize` and the info page.
    pub server_name: String,
    /// Emit the `endpoint` event when a stream opens.
    pub announce_endpoint: bool,
    /// Path that accepts inbound POSTs.
    pub message_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            keepalive_interval_secs: 30,
            channel_capacity: 256,
            max_body_bytes: 4 * 1024 * 1024,
            server_name: "beacon".to_string(),
            announce_endpoint: true,
            message_path: "/message".to_string(),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level for every target.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Per-target level overrides.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            modules: BTreeMap::new(),
        }
    }
}
