//! JSON-RPC 2.0 envelope.
//!
//! Inbound bodies are parsed into a [`JsonRpcMessage`], which is exactly one
//! of a request (has `method` and `id`), a notification (has `method`, no
//! `id`) or a response (has `id` and exactly one of `result` / `error`).
//! Anything else is rejected with an [`EnvelopeError`].

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only protocol version marker accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

// Standard JSON-RPC error codes
/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

/// Correlation id of a request. JSON-RPC allows numbers or strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Error member of a failed response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Short human-readable description.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    /// Build an error object without details.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// A call that expects a reply.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonRpcRequest {
    /// Correlation id echoed in the response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method-defined parameters.
    pub params: Option<Value>,
}

/// A one-way message; no reply is produced.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonRpcNotification {
    /// Method name.
    pub method: String,
    /// Method-defined parameters.
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Outcome carried by a response. `result` and `error` are mutually exclusive.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    /// Successful call.
    Result(Value),
    /// Failed call.
    Error(RpcErrorObject),
}

/// Reply to a request.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonRpcResponse {
    /// Id of the request being answered; `None` serializes as `null` (used
    /// when the request id could not be determined).
    pub id: Option<RequestId>,
    /// Result or error.
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    /// Error response.
    pub fn error(id: Option<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(RpcErrorObject::new(code, message)),
        }
    }

    /// Error response for an unregistered method.
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::error(
            Some(id),
            METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    /// Whether this response carries an error.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    /// The result value, if successful.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(v) => Some(v),
            ResponsePayload::Error(_) => None,
        }
    }

    /// The error object, if failed.
    pub fn error_object(&self) -> Option<&RpcErrorObject> {
        match &self.payload {
            ResponsePayload::Error(e) => Some(e),
            ResponsePayload::Result(_) => None,
        }
    }
}

/// Any well-formed JSON-RPC 2.0 message.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonRpcMessage {
    /// Call expecting a reply.
    Request(JsonRpcRequest),
    /// One-way call.
    Notification(JsonRpcNotification),
    /// Reply sent by the peer.
    Response(JsonRpcResponse),
}

/// Why a body is not a valid envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Body is not JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Batches are not accepted.
    #[error("batch messages are not supported")]
    Batch,
    /// Top-level value is not an object.
    #[error("message must be a JSON object")]
    NotAnObject,
    /// `jsonrpc` missing or not `"2.0"`.
    #[error("unsupported or missing jsonrpc version")]
    Version,
    /// A member has the wrong JSON type.
    #[error("invalid member `{0}`")]
    InvalidMember(&'static str),
    /// A method call also carries response members.
    #[error("message mixes request and response members")]
    Ambiguous,
    /// Response without an `id`.
    #[error("response is missing `id`")]
    MissingId,
    /// Response with both or neither of `result` and `error`.
    #[error("response must carry exactly one of `result` or `error`")]
    ResultErrorExclusive,
}

/// Deserialized shape before validation. A present `"result": null` is kept
/// as `Some(Value::Null)`.
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    jsonrpc: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    method: Option<Value>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    error: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn parse_id(value: Value) -> Result<Option<RequestId>, EnvelopeError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or(EnvelopeError::InvalidMember("id")),
        Value::String(s) => Ok(Some(RequestId::String(s))),
        _ => Err(EnvelopeError::InvalidMember("id")),
    }
}

impl JsonRpcMessage {
    /// Parse and validate a raw body.
    pub fn from_slice(body: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        match &value {
            Value::Array(_) => return Err(EnvelopeError::Batch),
            Value::Object(_) => {}
            _ => return Err(EnvelopeError::NotAnObject),
        }
        let raw: RawEnvelope = serde_json::from_value(value)?;

        match raw.jsonrpc {
            Some(Value::String(ref v)) if v == JSONRPC_VERSION => {}
            _ => return Err(EnvelopeError::Version),
        }

        let id = match raw.id {
            Some(v) => parse_id(v)?,
            None => None,
        };

        if let Some(method) = raw.method {
            let Value::String(method) = method else {
                return Err(EnvelopeError::InvalidMember("method"));
            };
            if raw.result.is_some() || raw.error.is_some() {
                return Err(EnvelopeError::Ambiguous);
            }
            if let Some(ref params) = raw.params {
                if !(params.is_object() || params.is_array()) {
                    return Err(EnvelopeError::InvalidMember("params"));
                }
            }
            return Ok(match id {
                Some(id) => Self::Request(JsonRpcRequest {
                    id,
                    method,
                    params: raw.params,
                }),
                None => Self::Notification(JsonRpcNotification {
                    method,
                    params: raw.params,
                }),
            });
        }

        let id = id.ok_or(EnvelopeError::MissingId)?;
        let payload = match (raw.result, raw.error) {
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => {
                let error: RpcErrorObject = serde_json::from_value(error)
                    .map_err(|_| EnvelopeError::InvalidMember("error"))?;
                ResponsePayload::Error(error)
            }
            _ => return Err(EnvelopeError::ResultErrorExclusive),
        };
        Ok(Self::Response(JsonRpcResponse {
            id: Some(id),
            payload,
        }))
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// Correlation id, if the message carries one.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Notification(_) => None,
            Self::Response(r) => r.id.as_ref(),
        }
    }

    /// Whether the sender expects a reply.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

impl Serialize for JsonRpcRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        map.end()
    }
}

impl Serialize for JsonRpcNotification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        map.end()
    }
}

impl Serialize for JsonRpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        match &self.payload {
            ResponsePayload::Result(result) => map.serialize_entry("result", result)?,
            ResponsePayload::Error(error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

impl Serialize for JsonRpcMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Request(r) => r.serialize(serializer),
            Self::Notification(n) => n.serialize(serializer),
            Self::Response(r) => r.serialize(serializer),
        }
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(n: JsonRpcNotification) -> Self {
        Self::Notification(n)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(r: JsonRpcResponse) -> Self {
        Self::Response(r)
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(r: JsonRpcRequest) -> Self {
        Self::Request(r)
    }
}
