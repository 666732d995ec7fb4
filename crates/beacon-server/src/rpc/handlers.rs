//! Built-in methods every gateway answers.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::context::RequestContext;
use super::errors::RpcError;
use super::registry::{MethodHandler, MethodRegistry};

/// Protocol revision reported when the client does not ask for one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Name and version reported by `initialize`.
#[derive(Clone, Debug)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// `initialize`: server identity and capabilities.
pub struct InitializeHandler {
    info: ServerInfo,
}

#[async_trait]
impl MethodHandler for InitializeHandler {
    async fn handle(&self, params: Option<Value>, _ctx: &RequestContext) -> Result<Value, RpcError> {
        let protocol_version = match params.as_ref().and_then(|p| p.get("protocolVersion")) {
            None => DEFAULT_PROTOCOL_VERSION.to_owned(),
            Some(Value::String(v)) => v.clone(),
            Some(_) => {
                return Err(RpcError::InvalidParams {
                    message: "'protocolVersion' must be a string".into(),
                })
            }
        };
        Ok(json!({
            "protocolVersion": protocol_version,
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version,
            },
            "capabilities": {},
        }))
    }
}

/// `ping`: empty result.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RequestContext) -> Result<Value, RpcError> {
        Ok(json!({}))
    }
}

/// `rpc.methods`: names registered at the time built-ins were added.
pub struct MethodsHandler {
    names: Vec<String>,
}

#[async_trait]
impl MethodHandler for MethodsHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RequestContext) -> Result<Value, RpcError> {
        Ok(json!(self.names))
    }
}

/// Register `initialize`, `ping` and `rpc.methods`.
///
/// Call after application methods are registered; `rpc.methods` lists a
/// snapshot taken here.
pub fn register_builtins(registry: &mut MethodRegistry, info: ServerInfo) {
    registry.register("initialize", InitializeHandler { info });
    registry.register("ping", PingHandler);
    let mut names = registry.methods();
    names.push("rpc.methods".to_owned());
    names.sort();
    registry.register("rpc.methods", MethodsHandler { names });
}
