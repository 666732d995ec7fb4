//! JSON-RPC dispatch: the [`Dispatcher`] seam, the stock [`MethodRegistry`]
//! and the built-in methods.

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;

pub use context::RequestContext;
pub use errors::RpcError;
pub use handlers::{register_builtins, ServerInfo};
pub use registry::{Dispatcher, MethodHandler, MethodRegistry};
