//! Errors returned by method handlers.

use beacon_core::jsonrpc::{INTERNAL_ERROR, INVALID_PARAMS};
use beacon_core::RpcErrorObject;
use serde_json::Value;

/// Server-defined code for a method that exists but cannot run right now.
pub const NOT_AVAILABLE: i64 = -32001;

/// Error produced by a [`MethodHandler`](super::registry::MethodHandler).
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Feature or backend not available.
    #[error("{message}")]
    NotAvailable {
        /// Description.
        message: String,
    },

    /// Application error with its own code.
    #[error("{message}")]
    Custom {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        data: Option<Value>,
    },
}

impl RpcError {
    /// JSON-RPC error code for this variant.
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::NotAvailable { .. } => NOT_AVAILABLE,
            Self::Custom { code, .. } => *code,
        }
    }

    /// Convert to the wire-format error object.
    pub fn to_error_object(&self) -> RpcErrorObject {
        RpcErrorObject {
            code: self.code(),
            message: self.to_string(),
            data: match self {
                Self::Custom { data, .. } => data.clone(),
                _ => None,
            },
        }
    }
}
