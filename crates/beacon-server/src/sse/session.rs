//! One open SSE stream and its lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use beacon_core::{JsonRpcMessage, JsonRpcResponse, SessionId};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::transport::{SseTransport, TransportError};
use crate::rpc::{Dispatcher, RequestContext};

/// Events every stream sends before anything else: `endpoint` and `hello`.
/// The outbound channel holds this many on top of its configured capacity.
pub const HANDSHAKE_EVENTS: usize = 2;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting sends.
    Open,
    /// A write failed; teardown is pending.
    Closing,
    /// Torn down; removed from the registry and the stream released.
    Closed,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closing => 1,
            Self::Closed => 2,
        }
    }
}

/// Atomic state cell shared by a session and its transport.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(SessionState::Open.as_u8()))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Open -> Closing`. Returns false if the session had already left `Open`.
    pub(crate) fn mark_closing(&self) -> bool {
        self.0
            .compare_exchange(
                SessionState::Open.as_u8(),
                SessionState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed`. Exactly one caller ever sees `true`.
    pub(crate) fn finish(&self) -> bool {
        self.0.swap(SessionState::Closed.as_u8(), Ordering::AcqRel) != SessionState::Closed.as_u8()
    }
}

/// Server-side state for one open SSE stream.
pub struct Session {
    id: SessionId,
    lifecycle: Arc<Lifecycle>,
    transport: SseTransport,
    keepalive: CancellationToken,
    dispatcher: Arc<dyn Dispatcher>,
    created_at: DateTime<Utc>,
    opened_at: Instant,
}

impl Session {
    /// Build a session and the receiving half of its outbound stream.
    pub(crate) fn open(
        id: SessionId,
        dispatcher: Arc<dyn Dispatcher>,
        channel_capacity: usize,
        keepalive: CancellationToken,
    ) -> (Self, mpsc::Receiver<Event>) {
        let lifecycle = Arc::new(Lifecycle::new());
        let capacity = channel_capacity.saturating_add(HANDSHAKE_EVENTS);
        let (transport, rx) = SseTransport::channel(lifecycle.clone(), capacity);
        let session = Self {
            id,
            lifecycle,
            transport,
            keepalive,
            dispatcher,
            created_at: Utc::now(),
            opened_at: Instant::now(),
        };
        (session, rx)
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.get()
    }

    /// Whether the session still accepts sends.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Outbound transport.
    pub fn transport(&self) -> &SseTransport {
        &self.transport
    }

    /// Wall-clock creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time since the stream opened.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Token cancelled when the session is torn down or the server shuts down.
    pub fn keepalive_token(&self) -> &CancellationToken {
        &self.keepalive
    }

    /// Hand an inbound message to the dispatcher and write any reply onto
    /// this session's stream.
    ///
    /// The dispatcher runs exactly once. The reply is returned even though it
    /// was also streamed so the POST can mirror it.
    pub async fn handle_inbound(
        &self,
        message: JsonRpcMessage,
    ) -> Result<Option<JsonRpcResponse>, TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        trace!(session_id = %self.id, method = ?message.method(), "dispatching");
        let ctx = RequestContext::new(self.id.clone());
        let response = self.dispatcher.dispatch(message, &ctx).await;
        if let Some(ref response) = response {
            let _ = self.transport.send(response)?;
        }
        Ok(response)
    }

    /// First half of teardown: claim it. Returns false if already claimed.
    pub(crate) fn begin_teardown(&self) -> bool {
        self.lifecycle.finish()
    }

    /// Second half of teardown: stop keepalive and release the stream.
    pub(crate) fn release(&self) {
        self.keepalive.cancel();
        let _ = self.transport.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use beacon_core::{JsonRpcNotification, JsonRpcRequest, RequestId};
    use crate::sse::transport::event_json;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Dispatcher for Counting {
        async fn dispatch(
            &self,
            message: JsonRpcMessage,
            _ctx: &RequestContext,
        ) -> Option<JsonRpcResponse> {
            let _ = self.0.fetch_add(1, Ordering::SeqCst);
            match message {
                JsonRpcMessage::Request(r) => Some(JsonRpcResponse::success(r.id, json!("ok"))),
                _ => None,
            }
        }
    }

    fn open(dispatcher: Arc<Counting>) -> (Session, mpsc::Receiver<Event>) {
        Session::open(
            SessionId::from_raw("sess_unit"),
            dispatcher,
            8,
            CancellationToken::new(),
        )
    }

    fn request(id: i64) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest {
            id: RequestId::Number(id),
            method: "m".into(),
            params: None,
        })
    }

    #[test]
    fn lifecycle_moves_forward() {
        let l = Lifecycle::new();
        assert_eq!(l.get(), SessionState::Open);
        assert!(l.mark_closing());
        assert!(!l.mark_closing());
        assert_eq!(l.get(), SessionState::Closing);
        assert!(l.finish());
        assert_eq!(l.get(), SessionState::Closed);
        assert!(!l.mark_closing());
    }

    #[test]
    fn finish_wins_once() {
        let l = Lifecycle::new();
        assert!(l.finish());
        assert!(!l.finish());
    }

    #[test]
    fn concurrent_finish_has_single_winner() {
        let l = Arc::new(Lifecycle::new());
        let winners: usize = (0..8)
            .map(|_| {
                let l = l.clone();
                std::thread::spawn(move || usize::from(l.finish()))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn request_reply_is_streamed_and_returned() {
        let d = Arc::new(Counting(AtomicUsize::new(0)));
        let (session, mut rx) = open(d.clone());

        let resp = session.handle_inbound(request(1)).await.unwrap().unwrap();
        assert_eq!(resp.id, Some(RequestId::Number(1)));
        assert_eq!(d.0.load(Ordering::SeqCst), 1);

        let v = event_json(rx.recv().await.unwrap()).await;
        assert_eq!(v["result"], "ok");
    }

    #[test]
    fn handshake_fits_beside_configured_capacity() {
        let d = Arc::new(Counting(AtomicUsize::new(0)));
        let (session, _rx) = Session::open(
            SessionId::from_raw("sess_small"),
            d,
            1,
            CancellationToken::new(),
        );
        let t = session.transport();
        t.send_endpoint("/message?sessionId=sess_small").unwrap();
        let _ = t.send_hello(session.id(), "beacon", "0.0.0").unwrap();
        let _ = t.send(&json!("first")).unwrap();
        assert!(session.is_open());
        assert!(matches!(t.send(&json!("second")), Err(TransportError::Backpressure)));
    }

    #[tokio::test]
    async fn notification_dispatches_without_writing() {
        let d = Arc::new(Counting(AtomicUsize::new(0)));
        let (session, mut rx) = open(d.clone());

        let msg = JsonRpcMessage::Notification(JsonRpcNotification::new("n", None));
        assert!(session.handle_inbound(msg).await.unwrap().is_none());
        assert_eq!(d.0.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_session_rejects_without_dispatch() {
        let d = Arc::new(Counting(AtomicUsize::new(0)));
        let (session, _rx) = open(d.clone());
        assert!(session.begin_teardown());
        session.release();

        let err = session.handle_inbound(request(2)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert_eq!(d.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn release_cancels_keepalive_and_ends_stream() {
        let d = Arc::new(Counting(AtomicUsize::new(0)));
        let (session, mut rx) = open(d);
        assert!(session.begin_teardown());
        session.release();
        assert!(session.keepalive_token().is_cancelled());
        assert!(rx.recv().await.is_none());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
