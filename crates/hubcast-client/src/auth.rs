//! Hub and server authentication.
//!
//! One `authenticate` entry point covers the three login modes:
//!
//! - **manual**: hub login only; servers are attached afterwards, each
//!   with its own credentials.
//! - **relay**: hub login; attach relays the already-validated hub
//!   credentials to every server.
//! - **auto-connect**: hub login plus discovery and attach of every
//!   server the user can access, with the same credentials, in one call.
//!
//! All three converge on the same shape: a [`HubSessionHandle`] plus a
//! possibly-partial map of server sessions, with per-server failure
//! reasons recorded for the misses.

use crate::aggregate::{aggregate, FailureReason, FanOutResponse, ServerFailure, ServerOutcome};
use crate::config::GatewayConfig;
use crate::fanout::{execute_on_targets, CallTarget, FanOutTimeouts};
use crate::session::{AuthMode, HubSession, HubSessionHandle, ServerSession, SessionStore};
use crate::topology::TopologyRetriever;
use futures_util::future::join_all;
use hubcast_core::{methods, Credentials, HubError, HubResult, RpcTransport, ServerId};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, warn};

/// Authenticates against the hub and its downstream servers.
pub struct Authenticator {
    transport: Arc<dyn RpcTransport>,
    store: Arc<SessionStore>,
    topology: TopologyRetriever,
    hub_endpoint: String,
    timeouts: FanOutTimeouts,
}

impl Authenticator {
    pub fn new(transport: Arc<dyn RpcTransport>, config: &GatewayConfig) -> Self {
        Self {
            topology: TopologyRetriever::new(transport.clone(), config.hub_api_url.clone()),
            store: Arc::new(SessionStore::new()),
            hub_endpoint: config.hub_api_url.clone(),
            timeouts: FanOutTimeouts::from_config(config),
            transport,
        }
    }

    /// Log in to the hub under the given mode.
    ///
    /// Manual and relay mode stop after the hub login; servers are
    /// attached afterwards with [`Authenticator::attach`]. Auto-connect
    /// additionally discovers the user's servers and attaches all of them
    /// with the hub credentials; per-server attach failures are recorded
    /// on the session, not raised.
    ///
    /// Fails with [`HubError::Auth`] on invalid credentials or an
    /// unreachable hub; nothing downstream is attempted in that case.
    pub async fn authenticate(
        &self,
        mode: AuthMode,
        credentials: Credentials,
    ) -> HubResult<HubSessionHandle> {
        let key = self.login_to_hub(&credentials, mode).await?;
        let handle = HubSessionHandle::new(key, self.store.clone());

        if mode == AuthMode::AutoConnect {
            if let Err(err) = self.attach_user_servers(&handle, &credentials).await {
                // The hub login already went through; the session must not
                // outlive a failed auto-connect.
                if let Err(logout_err) = self.logout(handle).await {
                    warn!(error = %logout_err, "cleanup logout failed");
                }
                return Err(err);
            }
        }
        Ok(handle)
    }

    /// Auto-connect discovery + attach: every server the user can access,
    /// with the hub credentials.
    async fn attach_user_servers(
        &self,
        handle: &HubSessionHandle,
        credentials: &Credentials,
    ) -> HubResult<()> {
        let server_ids = self
            .topology
            .user_server_ids(handle.key(), &credentials.username)
            .await?;
        let same_credentials = same_credentials_for(&server_ids, credentials);
        self.attach_with_credentials(handle, &server_ids, same_credentials)
            .await?;
        Ok(())
    }

    /// Attach the session to `server_ids`, logging in to each server's
    /// own API concurrently.
    ///
    /// Manual mode takes one credentials entry per server; a server
    /// without one is recorded as failed, it does not abort the round.
    /// Relay and auto-connect modes ignore `credentials_by_server` and
    /// reuse the hub credentials.
    pub async fn attach(
        &self,
        handle: &HubSessionHandle,
        server_ids: &[ServerId],
        credentials_by_server: HashMap<ServerId, Credentials>,
    ) -> HubResult<FanOutResponse> {
        let session = handle.session().await?;
        let credentials = match session.mode {
            AuthMode::Manual => credentials_by_server,
            AuthMode::Relay | AuthMode::AutoConnect => {
                same_credentials_for(server_ids, &session.credentials)
            }
        };
        self.attach_with_credentials(handle, server_ids, credentials)
            .await
    }

    /// List every server known to the hub (the usual prelude to a manual
    /// or relay attach).
    pub async fn list_server_ids(&self, handle: &HubSessionHandle) -> HubResult<Vec<ServerId>> {
        self.topology.list_server_ids(handle.key()).await
    }

    /// Probe the hub for the validity of this session's key.
    ///
    /// A key the hub no longer accepts (expiry, restart) drops the local
    /// session, so later calls fail fast with an invalid-session error.
    pub async fn is_session_valid(&self, handle: &HubSessionHandle) -> bool {
        let probe = self.transport.call(
            &self.hub_endpoint,
            methods::IS_SESSION_KEY_VALID,
            vec![json!(handle.key())],
        );
        match probe.await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(err) => {
                warn!(error = %err, "session validity probe failed, dropping session");
                self.store.remove_hub_session(handle.key()).await;
                false
            }
        }
    }

    /// Log out of the hub and every attached server.
    ///
    /// Consumes the handle, so a session is logged out at most once.
    /// Remote logouts are best-effort: failures are logged and the local
    /// session is removed regardless.
    pub async fn logout(&self, handle: HubSessionHandle) -> HubResult<()> {
        let key = handle.into_key();
        let session = self
            .store
            .remove_hub_session(&key)
            .await
            .ok_or_else(|| HubError::InvalidSession("unknown hub session key".into()))?;

        let server_logouts = session.server_sessions.values().map(|server| {
            let transport = self.transport.clone();
            async move {
                let call = transport.call(&server.endpoint, methods::LOGOUT, vec![json!(server.key)]);
                if let Err(err) = call.await {
                    warn!(server_id = server.server_id, error = %err, "server logout failed");
                }
            }
        });
        join_all(server_logouts).await;

        if let Err(err) = self
            .transport
            .call(&self.hub_endpoint, methods::LOGOUT, vec![json!(&key)])
            .await
        {
            warn!(error = %err, "hub logout failed");
        }
        info!("hub session closed");
        Ok(())
    }

    async fn login_to_hub(&self, credentials: &Credentials, mode: AuthMode) -> HubResult<String> {
        let login = self.transport.call(
            &self.hub_endpoint,
            methods::LOGIN,
            vec![json!(credentials.username), json!(credentials.password)],
        );
        let response = timeout(self.timeouts.per_call, login)
            .await
            .map_err(|_| HubError::Timeout)?
            .map_err(|err| HubError::Auth(format!("hub login failed: {err}")))?;

        let key = response
            .as_str()
            .ok_or_else(|| HubError::Auth("hub login returned a non-string session key".into()))?
            .to_string();
        self.store
            .save_hub_session(HubSession::new(key.clone(), credentials.clone(), mode))
            .await;
        info!(?mode, "logged in to hub");
        Ok(key)
    }

    /// Fan out `auth.login` to every server, then store sessions for the
    /// successes and failure records for the rest.
    async fn attach_with_credentials(
        &self,
        handle: &HubSessionHandle,
        server_ids: &[ServerId],
        credentials_by_server: HashMap<ServerId, Credentials>,
    ) -> HubResult<FanOutResponse> {
        let (endpoints, unresolved) = self
            .topology
            .server_endpoints(handle.key(), server_ids)
            .await;

        let mut preset_failures: Vec<ServerOutcome> = Vec::new();
        let mut targets = Vec::new();
        for &server_id in server_ids {
            let Some(endpoint) = endpoints.get(&server_id) else {
                let message = unresolved
                    .get(&server_id)
                    .cloned()
                    .unwrap_or_else(|| "endpoint resolution failed".to_string());
                preset_failures.push(ServerOutcome::Failure(ServerFailure {
                    server_id,
                    endpoint: String::new(),
                    reason: FailureReason::Unresolved(message),
                }));
                continue;
            };
            let Some(credentials) = credentials_by_server.get(&server_id) else {
                preset_failures.push(ServerOutcome::Failure(ServerFailure {
                    server_id,
                    endpoint: endpoint.clone(),
                    reason: FailureReason::MissingCredentials,
                }));
                continue;
            };
            targets.push(CallTarget {
                server_id,
                endpoint: endpoint.clone(),
                args: vec![json!(credentials.username), json!(credentials.password)],
            });
        }

        let mut outcomes =
            execute_on_targets(self.transport.clone(), methods::LOGIN, targets, self.timeouts)
                .await;
        outcomes.extend(preset_failures);
        let mut response = aggregate(server_ids, outcomes)?;

        // A login that returns anything but a session key string is a
        // failure, whatever the transport said.
        let malformed: Vec<ServerId> = response
            .successful
            .iter()
            .filter(|(_, success)| !success.response.is_string())
            .map(|(id, _)| *id)
            .collect();
        for server_id in malformed {
            if let Some(success) = response.successful.remove(&server_id) {
                response.failed.insert(
                    server_id,
                    ServerFailure {
                        server_id,
                        endpoint: success.endpoint,
                        reason: FailureReason::Call(
                            "login returned a non-string session key".into(),
                        ),
                    },
                );
            }
        }

        let mut server_sessions = HashMap::new();
        for (server_id, success) in &response.successful {
            if let Some(key) = success.response.as_str() {
                server_sessions.insert(
                    *server_id,
                    ServerSession {
                        server_id: *server_id,
                        endpoint: success.endpoint.clone(),
                        key: key.to_string(),
                    },
                );
            }
        }
        self.store
            .save_server_sessions(handle.key(), server_sessions, response.failed.clone())
            .await?;

        info!(
            attached = response.successful.len(),
            failed = response.failed.len(),
            "server attach complete"
        );
        Ok(response)
    }
}

fn same_credentials_for(
    server_ids: &[ServerId],
    credentials: &Credentials,
) -> HashMap<ServerId, Credentials> {
    server_ids
        .iter()
        .map(|&server_id| (server_id, credentials.clone()))
        .collect()
}
