//! hubcast-core: shared types for the hubcast gateway.
//!
//! Provides the error type, the abstract RPC transport trait, and the
//! hub/server method vocabulary used by the client crate.

pub mod error;
pub mod rpc;
pub mod transport;

// Re-export commonly used items at crate root.
pub use error::{HubError, HubResult};
pub use rpc::{methods, Credentials, ServerId};
pub use transport::{CallFuture, RpcTransport};
