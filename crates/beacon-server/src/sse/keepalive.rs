//! Periodic `ping` notifications that keep idle streams alive through
//! proxies.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::JsonRpcNotification;
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

use super::registry::SessionRegistry;
use super::session::Session;

/// Default cadence.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Why the keepalive loop ended. It never restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveResult {
    /// The session was torn down or the server is shutting down.
    Cancelled,
    /// The session left the registry or stopped being open; it has been
    /// closed.
    SessionGone,
    /// A ping could not be written; the session has been closed.
    SendFailed,
}

/// Build a `ping` notification stamped with the current time.
pub fn ping_notification() -> JsonRpcNotification {
    JsonRpcNotification::new(
        "ping",
        Some(json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })),
    )
}

/// Send a ping every `interval` until the session goes away.
///
/// The first ping goes out one full interval after the call.
pub async fn run_keepalive(
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    interval: Duration,
) -> KeepaliveResult {
    let cancel = session.keepalive_token().clone();
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return KeepaliveResult::Cancelled;
            }
            _ = ticker.tick() => {
                let registered = registry
                    .lookup(session.id().as_str())
                    .is_some_and(|current| Arc::ptr_eq(&current, &session));
                if !registered || !session.is_open() {
                    // A failed write elsewhere can leave the session Closing
                    // with nobody else to finish the teardown.
                    let _ = registry.close(&session);
                    return KeepaliveResult::SessionGone;
                }
                match session.transport().send(&ping_notification()) {
                    Ok(event_id) => trace!(session_id = %session.id(), event_id, "ping sent"),
                    Err(err) => {
                        debug!(session_id = %session.id(), error = %err, "ping failed");
                        let _ = registry.close(&session);
                        return KeepaliveResult::SendFailed;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MethodRegistry;
    use crate::sse::transport::event_json;
    use axum::response::sse::Event;
    use serde_json::Value;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn registry(capacity: usize) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(MethodRegistry::new()),
            capacity,
            CancellationToken::new(),
        ))
    }

    async fn next(rx: &mut mpsc::Receiver<Event>) -> Value {
        event_json(rx.recv().await.unwrap()).await
    }

    #[test]
    fn ping_has_rfc3339_timestamp() {
        let v = serde_json::to_value(ping_notification()).unwrap();
        assert_eq!(v["method"], "ping");
        let ts = v["params"]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "got: {ts}");
        assert!(v.get("id").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pings_every_interval() {
        let reg = registry(8);
        let (session, mut rx) = reg.create();
        let handle = tokio::spawn(run_keepalive(
            session.clone(),
            reg.clone(),
            KEEPALIVE_INTERVAL,
        ));

        let start = time::Instant::now();
        let first = next(&mut rx).await;
        assert_eq!(first["method"], "ping");
        assert!(start.elapsed() >= KEEPALIVE_INTERVAL);

        let second = next(&mut rx).await;
        assert_eq!(second["method"], "ping");
        assert!(start.elapsed() >= KEEPALIVE_INTERVAL * 2);

        assert!(reg.close(&session));
        assert_eq!(handle.await.unwrap(), KeepaliveResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn no_ping_before_first_interval() {
        let reg = registry(8);
        let (session, mut rx) = reg.create();
        let _handle = tokio::spawn(run_keepalive(session, reg.clone(), KEEPALIVE_INTERVAL));

        time::sleep(KEEPALIVE_INTERVAL - Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_removed_from_registry() {
        let reg = registry(8);
        let (session, _rx) = reg.create();
        let _ = reg.remove(session.id().as_str());
        let result = run_keepalive(session, reg, KEEPALIVE_INTERVAL).await;
        assert_eq!(result, KeepaliveResult::SessionGone);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_session_is_torn_down() {
        let reg = registry(1);
        let (session, _rx) = reg.create();
        // Fill the buffer until a send fails and leaves the session Closing.
        while session.transport().send(&serde_json::json!("fill")).is_ok() {}
        assert_eq!(session.state(), crate::sse::SessionState::Closing);
        assert_eq!(reg.len(), 1);

        let result = run_keepalive(session.clone(), reg.clone(), KEEPALIVE_INTERVAL).await;
        assert_eq!(result, KeepaliveResult::SessionGone);
        assert!(reg.is_empty());
        assert_eq!(session.state(), crate::sse::SessionState::Closed);
        assert!(session.keepalive_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_closes_session() {
        let reg = registry(8);
        let (session, rx) = reg.create();
        drop(rx);
        let result = run_keepalive(session.clone(), reg.clone(), KEEPALIVE_INTERVAL).await;
        assert_eq!(result, KeepaliveResult::SendFailed);
        assert!(reg.is_empty());
        assert!(!session.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_immediately_on_teardown() {
        let reg = registry(8);
        let (session, mut rx) = reg.create();
        let handle = tokio::spawn(run_keepalive(
            session.clone(),
            reg.clone(),
            KEEPALIVE_INTERVAL,
        ));
        assert!(reg.close(&session));
        assert_eq!(handle.await.unwrap(), KeepaliveResult::Cancelled);
        assert!(rx.recv().await.is_none());
    }
}
