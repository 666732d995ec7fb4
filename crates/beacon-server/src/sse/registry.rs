//! Concurrent map of open sessions.
//!
//! The registry is the only answer to "is this session still open". It is
//! built once per listener and shared by reference with every handler.

use std::sync::Arc;

use axum::response::sse::Event;
use beacon_core::SessionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::Session;
use crate::rpc::Dispatcher;

/// Open sessions keyed by id.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    dispatcher: Arc<dyn Dispatcher>,
    channel_capacity: usize,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    /// Create an empty registry.
    ///
    /// Every session's keepalive token is a child of `shutdown`.
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        channel_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            dispatcher,
            channel_capacity,
            shutdown,
        }
    }

    /// Create and insert a session under a fresh id.
    ///
    /// Returns the session and the receiver that feeds its response body.
    pub fn create(&self) -> (Arc<Session>, mpsc::Receiver<Event>) {
        loop {
            match self.sessions.entry(SessionId::new()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let (session, rx) = Session::open(
                        slot.key().clone(),
                        self.dispatcher.clone(),
                        self.channel_capacity,
                        self.shutdown.child_token(),
                    );
                    let session = Arc::new(session);
                    let _ = slot.insert(session.clone());
                    info!(session_id = %session.id(), open = self.sessions.len(), "session opened");
                    return (session, rx);
                }
            }
        }
    }

    /// Find an open session.
    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Drop the entry for `id`. Missing ids are ignored.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Tear a session down: mark it closed, drop it from the map, stop its
    /// keepalive and release its stream.
    ///
    /// Safe to call from any number of tasks; only the first call acts.
    pub fn close(&self, session: &Arc<Session>) -> bool {
        if !session.begin_teardown() {
            return false;
        }
        let _ = self
            .sessions
            .remove_if(session.id().as_str(), |_, current| Arc::ptr_eq(current, session));
        session.release();
        info!(
            session_id = %session.id(),
            age_secs = session.age().as_secs_f64(),
            open = self.sessions.len(),
            "session closed"
        );
        true
    }

    /// Close every open session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let open: Vec<Arc<Session>> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let closed = open.iter().filter(|s| self.close(s)).count();
        debug!(closed, "closed all sessions");
        closed
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
