//! `BeaconServer`: the axum listener for the SSE gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, HeaderName};
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::rpc::Dispatcher;
use crate::shutdown::ShutdownCoordinator;
use crate::sse::listener;
use crate::sse::SessionRegistry;

/// CORS headers stamped on every response.
pub fn cors_headers() -> [(HeaderName, HeaderValue); 6] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS, PUT, DELETE, PATCH, HEAD"),
        ),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*")),
        (
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        ),
        (header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("3600")),
        (header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*")),
    ]
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Open sessions.
    pub sessions: Arc<SessionRegistry>,
    /// Listener configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// The SSE gateway.
pub struct BeaconServer {
    config: Arc<ServerConfig>,
    sessions: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl BeaconServer {
    /// Create a server that forwards inbound messages to `dispatcher`.
    pub fn new(config: ServerConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let sessions = Arc::new(SessionRegistry::new(
            dispatcher,
            config.channel_capacity,
            shutdown.token(),
        ));
        Self {
            config: Arc::new(config),
            sessions,
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            sessions: self.sessions.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
        };

        let mut router = Router::new()
            .route("/", get(listener::index))
            .route("/sse", get(listener::open_stream))
            .route("/health", get(listener::health))
            .route(&self.config.message_path, post(listener::post_message))
            .fallback(listener::not_found)
            .method_not_allowed_fallback(listener::not_found)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(listener::preflight));

        // Outermost, so preflights and errors carry them too.
        for (name, value) in cors_headers() {
            router = router.layer(SetResponseHeaderLayer::overriding(name, value));
        }

        router.with_state(state)
    }

    /// Bind and serve in the background. Returns the bound address.
    ///
    /// The serve task stops accepting when shutdown begins, closes every
    /// session so open streams end, then drains in-flight requests.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();

        let token = self.shutdown.token();
        let sessions = self.sessions.clone();
        let handle = tokio::spawn(async move {
            let signal = async move {
                token.cancelled().await;
                let closed = sessions.close_all();
                info!(closed, "listener shutting down");
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %err, "listener failed");
            }
        });
        self.shutdown.track(handle);

        info!(%addr, "listening");
        Ok(addr)
    }

    /// Stop the listener and wait for it to drain.
    pub async fn shutdown(&self) {
        self.shutdown
            .graceful_shutdown(self.config.shutdown_timeout)
            .await;
        // Covers sessions opened after the serve task stopped polling.
        let _ = self.sessions.close_all();
    }

    /// Open sessions.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Get the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
