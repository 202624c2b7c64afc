//! In-memory RPC transport double for tests.
//!
//! Responses are scripted per (endpoint, method), optionally pinned to an
//! exact argument list. Later scripts shadow earlier ones, so tests can
//! install a healthy world and then break one server.

use hubcast_core::{methods, CallFuture, HubError, RpcTransport, ServerId};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const HUB: &str = "http://hub.example/rpc/api";

pub(crate) fn server_endpoint(server_id: ServerId) -> String {
    format!("http://srv{server_id}.example/rpc/api")
}

/// Scripted behavior for one call.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Ok(Value),
    Err(String),
    /// Sleep, then respond. Exercises timeouts and deadlines.
    Delay(Duration, Value),
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub endpoint: String,
    pub method: String,
    pub args: Vec<Value>,
}

struct Rule {
    endpoint: String,
    method: String,
    args: Option<Vec<Value>>,
    script: Script,
}

#[derive(Default)]
pub(crate) struct MockTransport {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for any call to (endpoint, method).
    pub fn on(&self, endpoint: &str, method: &str, script: Script) {
        self.rules.lock().unwrap().push(Rule {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            args: None,
            script,
        });
    }

    /// Script a response for a call with an exact argument list.
    /// Argument-pinned rules win over generic ones.
    pub fn on_args(&self, endpoint: &str, method: &str, args: Vec<Value>, script: Script) {
        self.rules.lock().unwrap().push(Rule {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            args: Some(args),
            script,
        });
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// How many calls hit (endpoint, method).
    pub fn count_calls(&self, endpoint: &str, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint == endpoint && c.method == method)
            .count()
    }
}

impl RpcTransport for MockTransport {
    fn call<'a>(&'a self, endpoint: &'a str, method: &'a str, args: Vec<Value>) -> CallFuture<'a> {
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            args: args.clone(),
        });

        let script = {
            let rules = self.rules.lock().unwrap();
            rules
                .iter()
                .rev()
                .find(|r| {
                    r.endpoint == endpoint
                        && r.method == method
                        && r.args.as_deref() == Some(&args[..])
                })
                .or_else(|| {
                    rules
                        .iter()
                        .rev()
                        .find(|r| r.endpoint == endpoint && r.method == method && r.args.is_none())
                })
                .map(|r| r.script.clone())
        };

        let method = method.to_string();
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            match script {
                Some(Script::Ok(value)) => Ok(value),
                Some(Script::Err(message)) => Err(HubError::Transport(message)),
                Some(Script::Delay(duration, value)) => {
                    tokio::time::sleep(duration).await;
                    Ok(value)
                }
                None => Err(HubError::Transport(format!(
                    "no scripted response for {method} at {endpoint}"
                ))),
            }
        })
    }
}

/// Install a healthy world: hub auth + topology for `ids`, and a login +
/// logout surface per server. Server `id` logs in to key `srv-key-{id}`.
pub(crate) fn install_world(mock: &MockTransport, hub_key: &str, ids: &[ServerId]) {
    mock.on(HUB, methods::LOGIN, Script::Ok(json!(hub_key)));
    mock.on(HUB, methods::LOGOUT, Script::Ok(json!(1)));
    mock.on(HUB, methods::IS_SESSION_KEY_VALID, Script::Ok(json!(true)));

    let systems: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
    mock.on(HUB, methods::LIST_SYSTEMS, Script::Ok(json!(systems.clone())));
    mock.on(HUB, methods::LIST_USER_SYSTEMS, Script::Ok(json!(systems)));

    for &id in ids {
        mock.on_args(
            HUB,
            methods::LIST_SYSTEM_FQDNS,
            vec![json!(hub_key), json!(id)],
            Script::Ok(json!([format!("srv{id}.example")])),
        );
        let endpoint = server_endpoint(id);
        mock.on(&endpoint, methods::LOGIN, Script::Ok(json!(format!("srv-key-{id}"))));
        mock.on(&endpoint, methods::LOGOUT, Script::Ok(json!(1)));
    }
}
