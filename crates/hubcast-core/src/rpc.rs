//! RPC vocabulary: server identities, credentials, and the method names the
//! hub and its downstream servers expose.

use serde::{Deserialize, Serialize};

/// Identity of a downstream server, as issued by the hub.
///
/// Immutable for the lifetime of the hub session that discovered it.
pub type ServerId = i64;

/// Username/password pair for a hub or server login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Method names spoken over the transport.
///
/// The hub and every downstream server expose the same `auth.*` surface;
/// the `system.*` methods exist on the hub only. One consistent set of
/// names is used everywhere (the upstream API was inconsistent about this).
pub mod methods {
    /// Log in to the hub or a server; returns a session key string.
    pub const LOGIN: &str = "auth.login";
    /// Invalidate a session key.
    pub const LOGOUT: &str = "auth.logout";
    /// Check whether a hub session key is still valid.
    pub const IS_SESSION_KEY_VALID: &str = "auth.isSessionKeyValid";
    /// List every server the hub manages.
    pub const LIST_SYSTEMS: &str = "system.listSystems";
    /// List the servers a given user has access to.
    pub const LIST_USER_SYSTEMS: &str = "system.listUserSystems";
    /// List the FQDNs of a single server.
    pub const LIST_SYSTEM_FQDNS: &str = "system.listFqdns";

    /// Field holding the server ID in `system.list*` entries.
    pub const SYSTEM_ID_FIELD: &str = "id";
}
