//! Resolve an inbound POST to its session and hand the message over.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beacon_core::{JsonRpcMessage, JsonRpcResponse};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::registry::SessionRegistry;
use super::session::Session;

/// Body member that may carry the session id when the query does not.
pub const SESSION_ID_FIELD: &str = "sessionId";

/// Why a POST was not delivered.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Neither the query nor the body named a session.
    #[error("No session ID in message or query parameters")]
    MissingSessionId,
    /// The named session is not open.
    #[error("Session not found")]
    NotFound,
    /// The session closed after lookup and before the reply was written.
    #[error("Session closed")]
    SessionClosed,
    /// The body is not a valid JSON-RPC message.
    #[error("{0}")]
    Malformed(String),
}

impl RouteError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingSessionId | Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::SessionClosed => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// A message matched to the session that should handle it.
#[derive(Debug)]
pub struct Routed {
    /// Target session.
    pub session: Arc<Session>,
    /// Validated envelope.
    pub message: JsonRpcMessage,
}

fn parse_json(body: &[u8]) -> Result<Value, RouteError> {
    serde_json::from_slice(body).map_err(|err| {
        warn!(error = %err, "rejecting non-JSON message body");
        RouteError::Malformed("Invalid JSON".to_owned())
    })
}

fn body_session_id(value: &Value) -> Result<Option<&str>, RouteError> {
    match value.get(SESSION_ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(RouteError::Malformed(format!(
            "'{SESSION_ID_FIELD}' must be a string"
        ))),
    }
}

fn lookup(registry: &SessionRegistry, id: &str) -> Result<Arc<Session>, RouteError> {
    registry.lookup(id).ok_or_else(|| {
        warn!(session_id = id, "message for unknown session");
        RouteError::NotFound
    })
}

/// Find the target session and validate the envelope.
///
/// The query id is used first and looked up before the body is parsed; the
/// body's `sessionId` is the fallback. Both present and different is
/// malformed. The session is never touched on failure.
pub fn resolve(
    registry: &SessionRegistry,
    query_id: Option<&str>,
    body: &[u8],
) -> Result<Routed, RouteError> {
    let query_id = query_id.filter(|id| !id.is_empty());

    let (session, value) = if let Some(id) = query_id {
        let session = lookup(registry, id)?;
        let value = parse_json(body)?;
        if let Some(body_id) = body_session_id(&value)? {
            if body_id != id {
                warn!(query = id, body = body_id, "conflicting session identifiers");
                return Err(RouteError::Malformed(
                    "Conflicting session IDs in query and message".to_owned(),
                ));
            }
        }
        (session, value)
    } else {
        let value = parse_json(body)?;
        let id = body_session_id(&value)?.ok_or(RouteError::MissingSessionId)?;
        (lookup(registry, id)?, value)
    };

    let message = JsonRpcMessage::from_value(value).map_err(|err| {
        warn!(session_id = %session.id(), error = %err, "malformed JSON-RPC message");
        RouteError::Malformed(format!("Invalid JSON-RPC message: {err}"))
    })?;

    Ok(Routed { session, message })
}

/// Resolve, dispatch, and stream any reply.
///
/// Returns the reply for requests so the POST can mirror it.
pub async fn route_message(
    registry: &SessionRegistry,
    query_id: Option<&str>,
    body: &[u8],
) -> Result<Option<JsonRpcResponse>, RouteError> {
    let Routed { session, message } = resolve(registry, query_id, body)?;
    debug!(session_id = %session.id(), method = ?message.method(), "routing message");

    match session.handle_inbound(message).await {
        Ok(reply) => Ok(reply),
        Err(err) => {
            debug!(session_id = %session.id(), error = %err, "reply not delivered");
            // Idempotent; finishes a teardown a failed write left pending.
            let _ = registry.close(&session);
            Err(RouteError::SessionClosed)
        }
    }
}
