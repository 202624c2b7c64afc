//! hubcast-client: multi-target session and fan-out RPC gateway client.
//!
//! Logs in to a coordinating hub, attaches to N downstream servers under
//! one of three authentication modes (manual, relay, auto-connect), and
//! dispatches fan-out calls across all attached servers concurrently,
//! aggregating per-server outcomes into one success/failure partition.
//!
//! Connection state is never ambient: [`auth::Authenticator`] returns a
//! [`session::HubSessionHandle`] that is threaded explicitly through the
//! [`fanout::FanOutInvoker`] and consumed by logout.

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod fanout;
pub mod session;
pub mod topology;

#[cfg(test)]
pub(crate) mod mock;

// Re-export commonly used items at crate root.
pub use aggregate::{aggregate, FailureReason, FanOutResponse, ServerFailure, ServerOutcome, ServerSuccess};
pub use auth::Authenticator;
pub use config::GatewayConfig;
pub use fanout::{FanOutArgs, FanOutInvoker, FanOutTimeouts};
pub use session::{AuthMode, HubSession, HubSessionHandle, ServerSession, SessionStore};
