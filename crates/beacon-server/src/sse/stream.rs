//! Response body for `GET /sse`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::Event;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use super::registry::SessionRegistry;
use super::session::Session;

/// Tears the session down when the response body is dropped, which is how
/// a client disconnect surfaces.
pub struct TeardownGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl TeardownGuard {
    /// Guard `session` against the stream going away.
    pub fn new(registry: Arc<SessionRegistry>, session: Arc<Session>) -> Self {
        Self { registry, session }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if self.registry.close(&self.session) {
            debug!(session_id = %self.session.id(), "stream dropped");
        }
    }
}

/// Events for one session, ending when the session is released.
///
/// The returned stream owns `teardown`, so dropping the response body
/// closes the session.
pub fn session_stream(
    rx: mpsc::Receiver<Event>,
    teardown: TeardownGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    ReceiverStream::new(rx).map(move |event| {
        let _owned = &teardown;
        Ok::<_, Infallible>(event)
    })
}
