//! Dispatcher seam and the stock method registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use beacon_core::jsonrpc::INTERNAL_ERROR;
use beacon_core::{JsonRpcMessage, JsonRpcResponse, ResponsePayload};
use serde_json::Value;
use tracing::{debug, warn};

use super::context::RequestContext;
use super::errors::RpcError;

/// Executes inbound JSON-RPC messages on behalf of a session.
///
/// Called exactly once per accepted POST. Returns `Some` for requests and
/// `None` for notifications and client-sent responses.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Handle one message.
    async fn dispatch(
        &self,
        message: JsonRpcMessage,
        ctx: &RequestContext,
    ) -> Option<JsonRpcResponse>;
}

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RequestContext) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    timeout: Duration,
}

impl MethodRegistry {
    /// Maximum time a single handler is allowed to run.
    pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

    const SLOW_CALL: Duration = Duration::from_secs(5);

    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: Self::HANDLER_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a handler for a method name, replacing any previous one.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    async fn invoke(
        &self,
        handler: &dyn MethodHandler,
        method: &str,
        params: Option<Value>,
        ctx: &RequestContext,
    ) -> Result<Value, RpcError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, handler.handle(params, ctx)).await;

        let elapsed = start.elapsed();
        if elapsed >= Self::SLOW_CALL {
            warn!(
                method,
                session_id = %ctx.session_id,
                duration_secs = elapsed.as_secs_f64(),
                "slow RPC call"
            );
        }

        result.unwrap_or_else(|_elapsed| {
            warn!(method, session_id = %ctx.session_id, "handler timed out after {:?}", self.timeout);
            Err(RpcError::Custom {
                code: INTERNAL_ERROR,
                message: format!("Handler for '{method}' timed out"),
                data: None,
            })
        })
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for MethodRegistry {
    async fn dispatch(
        &self,
        message: JsonRpcMessage,
        ctx: &RequestContext,
    ) -> Option<JsonRpcResponse> {
        match message {
            JsonRpcMessage::Request(request) => {
                let Some(handler) = self.handlers.get(&request.method) else {
                    debug!(method = %request.method, "method not found");
                    return Some(JsonRpcResponse::method_not_found(request.id, &request.method));
                };
                let result = self
                    .invoke(handler.as_ref(), &request.method, request.params, ctx)
                    .await;
                Some(match result {
                    Ok(value) => JsonRpcResponse::success(request.id, value),
                    Err(err) => JsonRpcResponse {
                        id: Some(request.id),
                        payload: ResponsePayload::Error(err.to_error_object()),
                    },
                })
            }
            JsonRpcMessage::Notification(notification) => {
                if let Some(handler) = self.handlers.get(&notification.method) {
                    if let Err(err) = self
                        .invoke(handler.as_ref(), &notification.method, notification.params, ctx)
                        .await
                    {
                        debug!(method = %notification.method, error = %err, "notification handler failed");
                    }
                } else {
                    debug!(method = %notification.method, "ignoring unhandled notification");
                }
                None
            }
            JsonRpcMessage::Response(response) => {
                debug!(id = ?response.id, "ignoring client response");
                None
            }
        }
    }
}
