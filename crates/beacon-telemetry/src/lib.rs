//! # beacon-telemetry
//!
//! Installs the process-wide `tracing` subscriber: an `EnvFilter` built from
//! `RUST_LOG` or the configured levels, and a pretty or JSON `fmt` layer.

#![deny(unsafe_code)]

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Log line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "beacon_server::sse" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Output format.
    pub format: OutputFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: OutputFormat::Pretty,
        }
    }
}

/// A level string that `tracing` does not recognise.
#[derive(Debug, thiserror::Error)]
#[error("unknown log level `{0}`")]
pub struct UnknownLevel(pub String);

/// Parse a level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(s: &str) -> Result<Level, UnknownLevel> {
    Level::from_str(s.trim()).map_err(|_| UnknownLevel(s.to_string()))
}

impl TelemetryConfig {
    /// Build from textual settings. Unknown module levels are rejected too.
    pub fn from_levels<'a>(
        level: &str,
        modules: impl IntoIterator<Item = (&'a String, &'a String)>,
        format: OutputFormat,
    ) -> Result<Self, UnknownLevel> {
        let module_levels = modules
            .into_iter()
            .map(|(m, l)| parse_level(l).map(|l| (m.clone(), l)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            log_level: parse_level(level)?,
            module_levels,
            format,
        })
    }
}

/// Filter directive used when RUST_LOG is not set.
pub fn build_filter_directive(config: &TelemetryConfig) -> String {
    let mut filter = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter.push(',');
        filter.push_str(module);
        filter.push('=');
        filter.push_str(&level.to_string().to_lowercase());
    }
    filter
}

/// Initialize the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(build_filter_directive(config)));

    let fmt_layer = match config.format {
        OutputFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()
}
