//! Hub and server session state.
//!
//! The session store maps hub session keys to their session state:
//! credentials, login mode, and the server sessions attached so far.
//! Server sessions never outlive the hub session they belong to.

use crate::aggregate::ServerFailure;
use hubcast_core::{Credentials, HubError, HubResult, ServerId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// How the hub session was established; determines how server sessions
/// are obtained during attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Hub login only; servers attached later with independent
    /// per-server credentials.
    Manual,
    /// Hub login; attach relays the already-validated hub credentials to
    /// each server.
    Relay,
    /// Hub login plus discovery and attach of all user servers with the
    /// same credentials, in one call.
    AutoConnect,
}

/// Per-server session obtained by logging in to the server's own API.
#[derive(Debug, Clone)]
pub struct ServerSession {
    pub server_id: ServerId,
    pub endpoint: String,
    pub key: String,
}

/// Session state for one hub login.
#[derive(Debug, Clone)]
pub struct HubSession {
    /// Opaque session key issued by the hub.
    pub key: String,
    /// Credentials used for the hub login (relayed to servers in relay
    /// and auto-connect modes).
    pub credentials: Credentials,
    pub mode: AuthMode,
    /// Sessions for the servers that attached successfully.
    pub server_sessions: HashMap<ServerId, ServerSession>,
    /// Servers that failed to attach, with the recorded reason.
    pub attach_failures: HashMap<ServerId, ServerFailure>,
}

impl HubSession {
    pub fn new(key: String, credentials: Credentials, mode: AuthMode) -> Self {
        Self {
            key,
            credentials,
            mode,
            server_sessions: HashMap::new(),
            attach_failures: HashMap::new(),
        }
    }
}

/// In-memory store of active hub sessions, keyed by hub session key.
///
/// Read-only from the invoker's point of view: only the authenticator
/// writes to it.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, HubSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a freshly created hub session.
    pub async fn save_hub_session(&self, session: HubSession) {
        let mut sessions = self.sessions.write().await;
        debug!(mode = ?session.mode, "hub session saved");
        sessions.insert(session.key.clone(), session);
    }

    /// Retrieve a hub session by key.
    pub async fn hub_session(&self, key: &str) -> Option<HubSession> {
        let sessions = self.sessions.read().await;
        sessions.get(key).cloned()
    }

    /// Remove a hub session, returning it if it was present.
    ///
    /// Server sessions have no independent lifetime: they go with it.
    pub async fn remove_hub_session(&self, key: &str) -> Option<HubSession> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(key);
        if removed.is_some() {
            info!("hub session removed");
        }
        removed
    }

    /// Record the outcome of an attach round for a hub session.
    ///
    /// A server that attaches successfully clears any earlier failure
    /// record, and vice versa.
    pub async fn save_server_sessions(
        &self,
        hub_key: &str,
        server_sessions: HashMap<ServerId, ServerSession>,
        failures: HashMap<ServerId, ServerFailure>,
    ) -> HubResult<()> {
        let mut sessions = self.sessions.write().await;
        let hub_session = sessions
            .get_mut(hub_key)
            .ok_or_else(|| HubError::InvalidSession("unknown hub session key".into()))?;

        for (server_id, session) in server_sessions {
            hub_session.attach_failures.remove(&server_id);
            hub_session.server_sessions.insert(server_id, session);
        }
        for (server_id, failure) in failures {
            hub_session.server_sessions.remove(&server_id);
            hub_session.attach_failures.insert(server_id, failure);
        }
        Ok(())
    }

    /// The server sessions currently attached to a hub session.
    pub async fn server_sessions(&self, hub_key: &str) -> HubResult<HashMap<ServerId, ServerSession>> {
        let sessions = self.sessions.read().await;
        let hub_session = sessions
            .get(hub_key)
            .ok_or_else(|| HubError::InvalidSession("unknown hub session key".into()))?;
        Ok(hub_session.server_sessions.clone())
    }
}

/// Handle to an authenticated hub session.
///
/// Deliberately not `Clone`: logout consumes the handle, so a session is
/// logged out at most once, and only after every in-flight fan-out borrow
/// of the handle has ended.
pub struct HubSessionHandle {
    key: String,
    store: Arc<SessionStore>,
}

impl fmt::Debug for HubSessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubSessionHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl HubSessionHandle {
    pub(crate) fn new(key: String, store: Arc<SessionStore>) -> Self {
        Self { key, store }
    }

    /// The hub session key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the full session state.
    ///
    /// Fails with [`HubError::InvalidSession`] once the session has been
    /// removed (logout, or an expired key detected by a validity probe).
    pub async fn session(&self) -> HubResult<HubSession> {
        self.store
            .hub_session(&self.key)
            .await
            .ok_or_else(|| HubError::InvalidSession("unknown hub session key".into()))
    }

    /// The server sessions currently attached.
    pub async fn server_sessions(&self) -> HubResult<HashMap<ServerId, ServerSession>> {
        self.store.server_sessions(&self.key).await
    }

    /// Attach failures recorded for this session, keyed by server.
    pub async fn attach_failures(&self) -> HubResult<HashMap<ServerId, ServerFailure>> {
        Ok(self.session().await?.attach_failures)
    }

    pub(crate) fn into_key(self) -> String {
        self.key
    }
}
