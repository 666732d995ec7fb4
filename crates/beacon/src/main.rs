//! # beacon
//!
//! JSON-RPC over Server-Sent Events gateway binary: loads settings, installs
//! logging, registers the built-in methods and serves until Ctrl-C or
//! SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_server::rpc::{register_builtins, MethodRegistry, ServerInfo};
use beacon_server::{BeaconServer, ServerConfig};
use beacon_settings::{LogFormat, Settings, SettingsOverrides};
use beacon_telemetry::{OutputFormat, TelemetryConfig};
use clap::Parser;
use tracing::info;

/// JSON-RPC over Server-Sent Events gateway.
#[derive(Parser, Debug)]
#[command(name = "beacon", version, about = "JSON-RPC over Server-Sent Events gateway")]
struct Cli {
    /// JSON settings file.
    #[arg(long, env = "BEACON_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Default log level (overrides settings; RUST_LOG wins over both).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            host: self.host.clone(),
            port: self.port,
            log_level: self.log_level.clone(),
        }
    }
}

fn server_config(settings: &Settings) -> ServerConfig {
    let s = &settings.server;
    ServerConfig {
        host: s.host.clone(),
        port: s.port,
        keepalive_interval: Duration::from_secs(s.keepalive_interval_secs),
        channel_capacity: s.channel_capacity,
        max_body_bytes: s.max_body_bytes,
        server_name: s.server_name.clone(),
        announce_endpoint: s.announce_endpoint,
        message_path: s.message_path.clone(),
        ..ServerConfig::default()
    }
}

fn telemetry_config(settings: &Settings) -> Result<TelemetryConfig> {
    let format = match settings.logging.format {
        LogFormat::Pretty => OutputFormat::Pretty,
        LogFormat::Json => OutputFormat::Json,
    };
    TelemetryConfig::from_levels(&settings.logging.level, &settings.logging.modules, format)
        .context("Invalid logging settings")
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = beacon_settings::load_settings_with(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load settings")?;
    beacon_telemetry::init_telemetry(&telemetry_config(&settings)?)
        .context("Failed to initialize logging")?;

    let config = server_config(&settings);
    let mut registry = MethodRegistry::new();
    register_builtins(
        &mut registry,
        ServerInfo {
            name: config.server_name.clone(),
            version: config.server_version.clone(),
        },
    );

    let server = BeaconServer::new(config, Arc::new(registry));
    let addr = server.listen().await.with_context(|| {
        format!(
            "Failed to bind {}:{}",
            server.config().host,
            server.config().port
        )
    })?;
    info!(%addr, name = %server.config().server_name, "beacon ready");

    shutdown_signal().await?;

    info!(open_sessions = server.sessions().len(), "shutting down");
    server.shutdown().await;
    Ok(())
}
