//! HTTP handlers for the SSE gateway routes.

use std::fmt::Write as _;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::sse::Sse;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, instrument, warn, Span};

use super::keepalive::run_keepalive;
use super::router::{route_message, RouteError};
use super::stream::{session_stream, TeardownGuard};
use crate::health::{self, HealthResponse};
use crate::server::AppState;

/// Query string accepted by the message route.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    /// Target session.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// `OPTIONS *`: answer every preflight before routing.
pub async fn preflight(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    next.run(request).await
}

/// `GET /sse`: open a session and stream it until the client goes away.
#[instrument(skip_all, fields(session_id))]
pub async fn open_stream(State(state): State<AppState>) -> Response {
    let (session, rx) = state.sessions.create();
    let _ = Span::current().record("session_id", tracing::field::display(session.id()));
    let config = &state.config;

    let endpoint = if config.announce_endpoint {
        let url = format!("{}?sessionId={}", config.message_path, session.id());
        session.transport().send_endpoint(&url)
    } else {
        Ok(())
    };
    let handshake = endpoint.and_then(|()| {
        session
            .transport()
            .send_hello(session.id(), &config.server_name, &config.server_version)
    });
    if let Err(err) = handshake {
        // The stream still returns and ends once the queued events drain.
        warn!(session_id = %session.id(), error = %err, "handshake failed");
        let _ = state.sessions.close(&session);
    }

    let _ = tokio::spawn({
        let session = session.clone();
        let sessions = state.sessions.clone();
        let interval = config.keepalive_interval;
        async move {
            let session_id = session.id().clone();
            let result = run_keepalive(session, sessions, interval).await;
            debug!(session_id = %session_id, reason = ?result, "keepalive stopped");
        }
    });

    let stream = session_stream(rx, TeardownGuard::new(state.sessions.clone(), session));
    (
        [(
            header::HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(stream),
    )
        .into_response()
}

/// `POST <message_path>`: deliver one JSON-RPC message.
pub async fn post_message(
    State(state): State<AppState>,
    query: Result<Query<MessageQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Response, RouteError> {
    let Query(query) = query.map_err(|rejection| {
        warn!(error = %rejection, "rejecting message query");
        RouteError::Malformed(rejection.body_text())
    })?;
    let reply = route_message(&state.sessions, query.session_id.as_deref(), &body).await?;
    Ok(match reply {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.sessions.len()))
}

/// `GET /`: human-readable status page.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let config = &state.config;
    let uptime = state.start_time.elapsed().as_secs();
    let name = escape_html(&config.server_name);
    let version = escape_html(&config.server_version);
    let message_path = escape_html(&config.message_path);

    let mut page = String::with_capacity(1024);
    let _ = write!(
        page,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{name}</title></head>\n<body>\n\
         <h1>{name} {version}</h1>\n\
         <p>JSON-RPC over Server-Sent Events.</p>\n\
         <ul>\n\
         <li><a href=\"/sse\">/sse</a>: open an event stream</li>\n\
         <li><code>POST {message_path}?sessionId=&lt;id&gt;</code>: send a message</li>\n\
         <li><a href=\"/health\">/health</a>: liveness probe</li>\n\
         </ul>\n\
         <p>Open sessions: {sessions}</p>\n\
         <p>Uptime: {uptime}s</p>\n\
         </body>\n</html>\n",
        sessions = state.sessions.len(),
    );
    Html(page)
}

/// Anything unrouted.
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
