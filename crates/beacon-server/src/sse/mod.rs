//! Session transport over Server-Sent Events.
//!
//! - [`session`]: one open stream and its `Open -> Closing -> Closed` lifecycle
//! - [`registry`]: concurrent map of open sessions, owner of teardown
//! - [`transport`]: SSE events and the bounded outbound channel
//! - [`stream`]: response body that tears the session down when dropped
//! - [`keepalive`]: periodic `ping` notifications
//! - [`router`]: POST resolution and delivery
//! - [`listener`]: axum handlers

pub mod keepalive;
pub mod listener;
pub mod registry;
pub mod router;
pub mod session;
pub mod stream;
pub mod transport;

pub use keepalive::{run_keepalive, KeepaliveResult, KEEPALIVE_INTERVAL};
pub use registry::SessionRegistry;
pub use router::{resolve, route_message, RouteError};
pub use session::{Session, SessionState, HANDSHAKE_EVENTS};
pub use stream::{session_stream, TeardownGuard};
pub use transport::{SseTransport, TransportError, ENDPOINT_EVENT, MESSAGE_EVENT};
