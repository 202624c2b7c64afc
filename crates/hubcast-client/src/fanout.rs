//! Concurrent fan-out of one operation across attached servers.
//!
//! One task per server, an independent timeout per call, and an optional
//! deadline over the whole round. Every requested server yields exactly
//! one outcome, including under cancellation: stragglers are aborted and
//! recorded as timeouts.

use crate::aggregate::{
    aggregate, FailureReason, FanOutResponse, ServerFailure, ServerOutcome, ServerSuccess,
};
use crate::config::GatewayConfig;
use crate::session::HubSessionHandle;
use hubcast_core::{HubError, HubResult, RpcTransport, ServerId};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Arguments for a fan-out call: one shared list broadcast to every
/// target, or an explicit list per server.
#[derive(Debug, Clone)]
pub enum FanOutArgs {
    Shared(Vec<Value>),
    PerServer(HashMap<ServerId, Vec<Value>>),
}

impl FanOutArgs {
    /// No arguments beyond the per-server session key.
    pub fn none() -> Self {
        FanOutArgs::Shared(Vec::new())
    }
}

/// Timeout policy for one fan-out round.
#[derive(Debug, Clone, Copy)]
pub struct FanOutTimeouts {
    /// Independent timeout for each per-server call.
    pub per_call: Duration,
    /// Optional deadline over the whole round.
    pub deadline: Option<Duration>,
}

impl FanOutTimeouts {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            per_call: config.call_timeout,
            deadline: config.fanout_deadline,
        }
    }
}

/// One dispatch target: a server, its endpoint, and the full argument
/// list (session key already prepended).
#[derive(Debug, Clone)]
pub(crate) struct CallTarget {
    pub server_id: ServerId,
    pub endpoint: String,
    pub args: Vec<Value>,
}

/// Dispatches fan-out calls over the attached servers of a hub session.
pub struct FanOutInvoker {
    transport: Arc<dyn RpcTransport>,
    timeouts: FanOutTimeouts,
}

impl FanOutInvoker {
    pub fn new(transport: Arc<dyn RpcTransport>, timeouts: FanOutTimeouts) -> Self {
        Self {
            transport,
            timeouts,
        }
    }

    /// Invoke `method` on every server attached to the session.
    ///
    /// The server's own session key is prepended to the arguments of each
    /// per-server call.
    pub async fn invoke(
        &self,
        handle: &HubSessionHandle,
        method: &str,
        args: FanOutArgs,
    ) -> HubResult<FanOutResponse> {
        let sessions = handle.server_sessions().await?;
        let mut server_ids: Vec<ServerId> = sessions.keys().copied().collect();
        server_ids.sort_unstable();
        self.invoke_on(handle, method, &server_ids, args).await
    }

    /// Invoke `method` on an explicit subset of attached servers.
    ///
    /// `FanOutArgs::PerServer` must cover exactly the requested set; a
    /// server that is not attached is a caller error.
    pub async fn invoke_on(
        &self,
        handle: &HubSessionHandle,
        method: &str,
        server_ids: &[ServerId],
        args: FanOutArgs,
    ) -> HubResult<FanOutResponse> {
        let sessions = handle.server_sessions().await?;

        if let FanOutArgs::PerServer(by_server) = &args {
            if by_server.len() != server_ids.len() {
                return Err(HubError::Other(format!(
                    "per-server arguments cover {} servers but {} were requested",
                    by_server.len(),
                    server_ids.len()
                )));
            }
        }

        let mut targets = Vec::with_capacity(server_ids.len());
        for &server_id in server_ids {
            let session = sessions.get(&server_id).ok_or_else(|| {
                HubError::InvalidSession(format!("server {server_id} is not attached"))
            })?;
            let extra = match &args {
                FanOutArgs::Shared(shared) => shared.clone(),
                FanOutArgs::PerServer(by_server) => by_server
                    .get(&server_id)
                    .cloned()
                    .ok_or_else(|| {
                        HubError::Other(format!("no arguments supplied for server {server_id}"))
                    })?,
            };
            let mut call_args = vec![json!(session.key)];
            call_args.extend(extra);
            targets.push(CallTarget {
                server_id,
                endpoint: session.endpoint.clone(),
                args: call_args,
            });
        }

        let outcomes =
            execute_on_targets(self.transport.clone(), method, targets, self.timeouts).await;
        aggregate(server_ids, outcomes)
    }
}

/// Run one call per target concurrently and gather the raw outcomes.
///
/// A call that errors or exceeds `per_call` becomes a failure outcome for
/// that server only. When the deadline expires, outstanding tasks are
/// aborted and their servers recorded as timed out, so the outcome set
/// always covers every target.
pub(crate) async fn execute_on_targets(
    transport: Arc<dyn RpcTransport>,
    method: &str,
    targets: Vec<CallTarget>,
    timeouts: FanOutTimeouts,
) -> Vec<ServerOutcome> {
    debug!(method, targets = targets.len(), "dispatching fan-out call");

    let endpoints: HashMap<ServerId, String> = targets
        .iter()
        .map(|t| (t.server_id, t.endpoint.clone()))
        .collect();

    let mut join_set = JoinSet::new();
    for target in targets {
        let transport = transport.clone();
        let method = method.to_string();
        let per_call = timeouts.per_call;
        join_set.spawn(async move {
            let CallTarget {
                server_id,
                endpoint,
                args,
            } = target;
            match timeout(per_call, transport.call(&endpoint, &method, args)).await {
                Ok(Ok(response)) => ServerOutcome::Success(ServerSuccess {
                    server_id,
                    endpoint,
                    response,
                }),
                Ok(Err(err)) => {
                    warn!(server_id, error = %err, "fan-out call failed");
                    ServerOutcome::Failure(ServerFailure {
                        server_id,
                        endpoint,
                        reason: FailureReason::Call(err.to_string()),
                    })
                }
                Err(_) => {
                    warn!(server_id, "fan-out call timed out");
                    ServerOutcome::Failure(ServerFailure {
                        server_id,
                        endpoint,
                        reason: FailureReason::Timeout,
                    })
                }
            }
        });
    }

    let mut outcomes: Vec<ServerOutcome> = Vec::with_capacity(endpoints.len());
    let collect = async {
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(error = %err, "fan-out task failed to join"),
            }
        }
    };

    match timeouts.deadline {
        Some(deadline) => {
            if timeout(deadline, collect).await.is_err() {
                join_set.abort_all();
            }
        }
        None => collect.await,
    }

    // Servers whose task was aborted at the deadline still owe an outcome.
    let seen: HashSet<ServerId> = outcomes.iter().map(ServerOutcome::server_id).collect();
    for (server_id, endpoint) in endpoints {
        if !seen.contains(&server_id) {
            warn!(server_id, "fan-out call cancelled at deadline");
            outcomes.push(ServerOutcome::Failure(ServerFailure {
                server_id,
                endpoint,
                reason: FailureReason::Timeout,
            }));
        }
    }
    outcomes
}
