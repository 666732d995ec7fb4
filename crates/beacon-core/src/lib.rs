//! # beacon-core
//!
//! Wire-level types shared by every beacon crate.
//!
//! - Opaque session identifiers handed to SSE clients
//! - The JSON-RPC 2.0 envelope: parsing, validation and construction
//! - Standard JSON-RPC error codes

#![deny(unsafe_code)]

pub mod ids;
pub mod jsonrpc;

pub use ids::SessionId;
pub use jsonrpc::{
    EnvelopeError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, ResponsePayload, RpcErrorObject, JSONRPC_VERSION,
};
