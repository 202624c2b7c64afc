//! Abstract RPC transport trait.
//!
//! The gateway is transport-agnostic: any request/response carrier
//! (XML-RPC, JSON-RPC, an in-memory test double) can back it by
//! implementing [`RpcTransport`].

use crate::error::HubResult;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// A boxed future resolving to one RPC response value.
pub type CallFuture<'a> = Pin<Box<dyn Future<Output = HubResult<Value>> + Send + 'a>>;

/// A request/response RPC carrier.
///
/// `endpoint` is the API URL of the hub or of a downstream server,
/// `method` is one of the names in [`crate::rpc::methods`] or a
/// fan-out-capable operation, and `args` are positional arguments.
pub trait RpcTransport: Send + Sync {
    /// Execute one remote call and return its decoded result.
    fn call<'a>(&'a self, endpoint: &'a str, method: &'a str, args: Vec<Value>) -> CallFuture<'a>;
}
