//! # beacon-server
//!
//! JSON-RPC sessions over Server-Sent Events.
//!
//! - `GET /sse` opens a stream and registers a session
//! - `POST /message?sessionId=<id>` delivers one message to that session's
//!   [`Dispatcher`](rpc::Dispatcher); replies go back down the stream
//! - Keepalive pings every 30 seconds, teardown on disconnect
//! - Health and info endpoints, CORS on every response
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod sse;

pub use config::ServerConfig;
pub use server::{AppState, BeaconServer};
