//! Server topology discovery via the hub.
//!
//! The hub knows which servers exist, which of them a user may access,
//! and the FQDNs their APIs are reachable at. Endpoint resolution
//! failures are reported per-server so a single unresolvable server
//! cannot sink an attach round.

use futures_util::future::join_all;
use hubcast_core::{methods, HubError, HubResult, RpcTransport, ServerId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Retrieves server topology information from the hub.
pub struct TopologyRetriever {
    transport: Arc<dyn RpcTransport>,
    hub_endpoint: String,
}

impl TopologyRetriever {
    pub fn new(transport: Arc<dyn RpcTransport>, hub_endpoint: String) -> Self {
        Self {
            transport,
            hub_endpoint,
        }
    }

    /// List every server the hub manages.
    pub async fn list_server_ids(&self, hub_key: &str) -> HubResult<Vec<ServerId>> {
        let response = self
            .transport
            .call(&self.hub_endpoint, methods::LIST_SYSTEMS, vec![json!(hub_key)])
            .await?;
        parse_system_ids(&response)
    }

    /// List the servers a user has access to (auto-connect discovery).
    pub async fn user_server_ids(&self, hub_key: &str, username: &str) -> HubResult<Vec<ServerId>> {
        let response = self
            .transport
            .call(
                &self.hub_endpoint,
                methods::LIST_USER_SYSTEMS,
                vec![json!(hub_key), json!(username)],
            )
            .await?;
        parse_system_ids(&response)
    }

    /// Resolve the API endpoint of each server from its first FQDN.
    ///
    /// Returns the resolved endpoints plus a per-server error message for
    /// every server that could not be resolved.
    pub async fn server_endpoints(
        &self,
        hub_key: &str,
        server_ids: &[ServerId],
    ) -> (HashMap<ServerId, String>, HashMap<ServerId, String>) {
        let lookups = server_ids.iter().map(|&server_id| async move {
            let result = self
                .transport
                .call(
                    &self.hub_endpoint,
                    methods::LIST_SYSTEM_FQDNS,
                    vec![json!(hub_key), json!(server_id)],
                )
                .await
                .and_then(|response| parse_first_fqdn(&response));
            (server_id, result)
        });

        let mut endpoints = HashMap::new();
        let mut unresolved = HashMap::new();
        for (server_id, result) in join_all(lookups).await {
            match result {
                Ok(fqdn) => {
                    endpoints.insert(server_id, endpoint_from_fqdn(&fqdn));
                }
                Err(err) => {
                    warn!(server_id, error = %err, "failed to resolve server endpoint");
                    unresolved.insert(server_id, err.to_string());
                }
            }
        }
        (endpoints, unresolved)
    }
}

/// Extract the numeric IDs from a `system.list*` response.
fn parse_system_ids(value: &Value) -> HubResult<Vec<ServerId>> {
    let entries = value
        .as_array()
        .ok_or_else(|| HubError::Transport("expected an array of systems".into()))?;
    entries
        .iter()
        .map(|entry| {
            entry
                .get(methods::SYSTEM_ID_FIELD)
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    HubError::Transport(format!(
                        "system entry without a numeric '{}' field",
                        methods::SYSTEM_ID_FIELD
                    ))
                })
        })
        .collect()
}

/// Take the first FQDN from a `system.listFqdns` response.
fn parse_first_fqdn(value: &Value) -> HubResult<String> {
    value
        .as_array()
        .and_then(|fqdns| fqdns.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HubError::Transport("server reported no FQDN".into()))
}

fn endpoint_from_fqdn(fqdn: &str) -> String {
    format!("http://{fqdn}/rpc/api")
}
