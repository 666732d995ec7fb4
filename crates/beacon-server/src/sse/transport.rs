//! SSE events and the per-session outbound channel.
//!
//! Events are built up front and pushed into a bounded channel whose
//! receiver backs the [`Sse`](axum::response::sse::Sse) response. Writes
//! never wait: a full or dropped channel is a failed send and moves the
//! session to `Closing`.

use std::sync::Arc;

use axum::response::sse::Event;
use beacon_core::{JsonRpcNotification, SessionId};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;

use super::session::{Lifecycle, SessionState};

/// Event name for JSON-RPC payloads.
pub const MESSAGE_EVENT: &str = "message";
/// Event name for the POST endpoint announcement.
pub const ENDPOINT_EVENT: &str = "endpoint";

/// Why a send did not reach the stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The session is no longer open.
    #[error("session closed")]
    Closed,
    /// The client went away.
    #[error("client disconnected")]
    Disconnected,
    /// The client is not draining its stream.
    #[error("outbound buffer full")]
    Backpressure,
    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

struct Outbound {
    sender: Option<mpsc::Sender<Event>>,
    next_event_id: u64,
}

/// Writes SSE events onto one session's stream.
pub struct SseTransport {
    lifecycle: Arc<Lifecycle>,
    outbound: Mutex<Outbound>,
}

impl SseTransport {
    pub(crate) fn channel(
        lifecycle: Arc<Lifecycle>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.clamp(1, Semaphore::MAX_PERMITS));
        let transport = Self {
            lifecycle,
            outbound: Mutex::new(Outbound {
                sender: Some(tx),
                next_event_id: 1,
            }),
        };
        (transport, rx)
    }

    /// Serialize `message` and write it as a `message` event.
    ///
    /// Returns the event id assigned to the event.
    pub fn send(&self, message: &impl Serialize) -> Result<u64, TransportError> {
        if self.lifecycle.get() != SessionState::Open {
            return Err(TransportError::Closed);
        }
        let data = serde_json::to_string(message)?;
        self.write(MESSAGE_EVENT, &data, true).map(|id| id.unwrap_or_default())
    }

    /// Announce the URL the client should POST to.
    pub fn send_endpoint(&self, url: &str) -> Result<(), TransportError> {
        if self.lifecycle.get() != SessionState::Open {
            return Err(TransportError::Closed);
        }
        self.write(ENDPOINT_EVENT, url, false).map(|_| ())
    }

    /// Send the `hello` notification that confirms the channel.
    pub fn send_hello(
        &self,
        session_id: &SessionId,
        server_name: &str,
        server_version: &str,
    ) -> Result<u64, TransportError> {
        let hello = JsonRpcNotification::new(
            "hello",
            Some(json!({
                "sessionId": session_id,
                "serverName": server_name,
                "serverVersion": server_version,
            })),
        );
        self.send(&hello)
    }

    // Fields are emitted in builder order, so the id goes in before the data.
    fn write(&self, name: &str, data: &str, numbered: bool) -> Result<Option<u64>, TransportError> {
        let mut guard = self.outbound.lock();
        let outbound = &mut *guard;
        let Some(sender) = outbound.sender.as_ref() else {
            return Err(TransportError::Closed);
        };
        let id = numbered.then_some(outbound.next_event_id);
        let mut event = Event::default().event(name);
        if let Some(id) = id {
            event = event.id(id.to_string());
        }
        let event = event.data(data);
        match sender.try_send(event) {
            Ok(()) => {
                if numbered {
                    outbound.next_event_id += 1;
                }
                Ok(id)
            }
            Err(TrySendError::Closed(_)) => {
                let _ = self.lifecycle.mark_closing();
                Err(TransportError::Disconnected)
            }
            Err(TrySendError::Full(_)) => {
                let _ = self.lifecycle.mark_closing();
                Err(TransportError::Backpressure)
            }
        }
    }

    /// Release the stream. Only the first call does anything.
    pub fn close(&self) -> bool {
        self.outbound.lock().sender.take().is_some()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.outbound.lock().sender.is_none()
    }
}

/// Render events exactly as the response body would carry them.
#[cfg(test)]
pub(crate) async fn render(events: Vec<Event>) -> String {
    use axum::response::{sse::Sse, IntoResponse};

    let stream = futures::stream::iter(events.into_iter().map(Ok::<_, std::convert::Infallible>));
    let body = axum::body::to_bytes(Sse::new(stream).into_response().into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Parse the JSON payload of one rendered event.
#[cfg(test)]
pub(crate) async fn event_json(event: Event) -> serde_json::Value {
    let text = render(vec![event]).await;
    let data = text.lines().find_map(|l| l.strip_prefix("data: ")).unwrap();
    serde_json::from_str(data).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(capacity: usize) -> (SseTransport, mpsc::Receiver<Event>, Arc<Lifecycle>) {
        let lifecycle = Arc::new(Lifecycle::new());
        let (t, rx) = SseTransport::channel(lifecycle.clone(), capacity);
        (t, rx, lifecycle)
    }

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn message_event_wire_format() {
        let (t, mut rx, _) = transport(4);
        assert_eq!(t.send(&json!({"a": 1})).unwrap(), 1);
        assert_eq!(
            render(drain(&mut rx)).await,
            "event: message\nid: 1\ndata: {\"a\":1}\n\n"
        );
    }

    #[tokio::test]
    async fn multiline_strings_stay_on_one_data_line() {
        let (t, mut rx, _) = transport(4);
        let _ = t.send(&json!("one\ntwo")).unwrap();
        let text = render(drain(&mut rx)).await;
        assert_eq!(text.matches("data: ").count(), 1, "got: {text}");
        assert!(text.contains(r#"data: "one\ntwo""#), "got: {text}");
    }

    #[tokio::test]
    async fn hello_carries_identity() {
        let (t, mut rx, _) = transport(4);
        let id = SessionId::from_raw("sess_h");
        assert_eq!(t.send_hello(&id, "beacon", "1.2.3").unwrap(), 1);

        let event = rx.recv().await.unwrap();
        let v = event_json(event).await;
        assert_eq!(v["method"], "hello");
        assert_eq!(v["params"]["sessionId"], "sess_h");
        assert_eq!(v["params"]["serverName"], "beacon");
        assert_eq!(v["params"]["serverVersion"], "1.2.3");
        assert!(v.get("id").is_none());
    }

    #[tokio::test]
    async fn event_ids_are_sequential_and_ordered() {
        let (t, mut rx, _) = transport(8);
        for n in 0..3 {
            assert_eq!(t.send(&json!({"n": n})).unwrap(), n + 1);
        }
        let text = render(drain(&mut rx)).await;
        let frames: Vec<&str> = text.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 3);
        for (n, frame) in frames.iter().enumerate() {
            assert!(frame.contains(&format!("id: {}\n", n + 1)), "got: {frame}");
            assert!(frame.contains(&format!("{{\"n\":{n}}}")), "got: {frame}");
        }
    }

    #[tokio::test]
    async fn endpoint_event_has_no_id() {
        let (t, mut rx, _) = transport(4);
        t.send_endpoint("/message?sessionId=sess_e").unwrap();
        assert_eq!(
            render(drain(&mut rx)).await,
            "event: endpoint\ndata: /message?sessionId=sess_e\n\n"
        );
        assert_eq!(t.send(&json!(1)).unwrap(), 1);
    }

    #[test]
    fn dropped_receiver_marks_closing() {
        let (t, rx, lifecycle) = transport(4);
        drop(rx);
        assert!(matches!(t.send(&json!(1)), Err(TransportError::Disconnected)));
        assert_eq!(lifecycle.get(), SessionState::Closing);
        assert!(matches!(t.send(&json!(2)), Err(TransportError::Closed)));
    }

    #[test]
    fn full_buffer_marks_closing() {
        let (t, _rx, lifecycle) = transport(1);
        let _ = t.send(&json!(1)).unwrap();
        assert!(matches!(t.send(&json!(2)), Err(TransportError::Backpressure)));
        assert_eq!(lifecycle.get(), SessionState::Closing);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (t, mut rx, _) = transport(4);
        assert!(!t.is_closed());
        assert!(t.close());
        assert!(!t.close());
        assert!(t.is_closed());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn send_after_close_fails() {
        let (t, _rx, _) = transport(4);
        let _ = t.close();
        assert!(matches!(t.send(&json!(1)), Err(TransportError::Closed)));
    }
}
