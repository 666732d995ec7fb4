//! Server configuration.

use std::time::Duration;

use crate::sse::KEEPALIVE_INTERVAL;

/// Configuration for the SSE gateway.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Time between keepalive pings on each stream.
    pub keepalive_interval: Duration,
    /// Outbound frames buffered per session, not counting the handshake.
    pub channel_capacity: usize,
    /// Largest accepted POST body in bytes.
    pub max_body_bytes: usize,
    /// Reported in `hello` and on the info page.
    pub server_name: String,
    /// Reported in `hello` and on the info page.
    pub server_version: String,
    /// Send the `endpoint` event when a stream opens.
    pub announce_endpoint: bool,
    /// Route for inbound messages.
    pub message_path: String,
    /// How long shutdown waits for the listener to drain.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            keepalive_interval: KEEPALIVE_INTERVAL,
            channel_capacity: 256,
            max_body_bytes: 4 * 1024 * 1024, // 4 MiB
            server_name: "beacon".into(),
            server_version: env!("CARGO_PKG_VERSION").into(),
            announce_endpoint: true,
            message_path: "/message".into(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}
