//! Fan-out result aggregation.
//!
//! Pure partition-building over per-server outcomes, no I/O. Every
//! requested server ends up on exactly one side of the partition; an
//! outcome for a server that was never requested is rejected as a
//! protocol bug.

use hubcast_core::{HubError, HubResult, ServerId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Why a server landed in the failed partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The call did not complete within its timeout or was cancelled at
    /// the fan-out deadline.
    Timeout,
    /// The remote call returned an error indication.
    Call(String),
    /// No API endpoint could be resolved for the server.
    Unresolved(String),
    /// Manual-mode attach with no credentials supplied for this server.
    MissingCredentials,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "call timed out"),
            FailureReason::Call(msg) => write!(f, "call failed: {msg}"),
            FailureReason::Unresolved(msg) => write!(f, "endpoint resolution failed: {msg}"),
            FailureReason::MissingCredentials => write!(f, "no credentials supplied"),
        }
    }
}

/// Successful outcome for one server.
#[derive(Debug, Clone)]
pub struct ServerSuccess {
    pub server_id: ServerId,
    pub endpoint: String,
    pub response: Value,
}

/// Failed outcome for one server.
#[derive(Debug, Clone)]
pub struct ServerFailure {
    pub server_id: ServerId,
    pub endpoint: String,
    pub reason: FailureReason,
}

/// Raw per-server outcome, before aggregation.
#[derive(Debug, Clone)]
pub enum ServerOutcome {
    Success(ServerSuccess),
    Failure(ServerFailure),
}

impl ServerOutcome {
    pub fn server_id(&self) -> ServerId {
        match self {
            ServerOutcome::Success(s) => s.server_id,
            ServerOutcome::Failure(f) => f.server_id,
        }
    }
}

/// The success/failure partition of one fan-out call, keyed by server
/// identity. Order across servers is not significant.
#[derive(Debug, Clone, Default)]
pub struct FanOutResponse {
    pub successful: HashMap<ServerId, ServerSuccess>,
    pub failed: HashMap<ServerId, ServerFailure>,
}

impl FanOutResponse {
    /// Number of servers covered by the partition.
    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successful.is_empty() && self.failed.is_empty()
    }

    /// True when every requested server succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Merge raw outcomes into a [`FanOutResponse`].
///
/// Fails with [`HubError::Aggregation`] when an outcome references a server
/// outside `requested` (a misbehaving remote or a dispatch bug), when a
/// server yields more than one outcome, or when a requested server is
/// missing from the outcomes. On success the partition covers exactly the
/// requested set, each server on one side.
pub fn aggregate(requested: &[ServerId], outcomes: Vec<ServerOutcome>) -> HubResult<FanOutResponse> {
    let requested_set: HashSet<ServerId> = requested.iter().copied().collect();
    let mut response = FanOutResponse::default();

    for outcome in outcomes {
        let server_id = outcome.server_id();
        if !requested_set.contains(&server_id) {
            return Err(HubError::Aggregation(format!(
                "outcome for server {server_id}, which was not a requested target"
            )));
        }
        if response.successful.contains_key(&server_id) || response.failed.contains_key(&server_id)
        {
            return Err(HubError::Aggregation(format!(
                "duplicate outcome for server {server_id}"
            )));
        }
        match outcome {
            ServerOutcome::Success(s) => {
                response.successful.insert(server_id, s);
            }
            ServerOutcome::Failure(f) => {
                response.failed.insert(server_id, f);
            }
        }
    }

    if response.len() != requested_set.len() {
        let missing: Vec<ServerId> = requested_set
            .iter()
            .copied()
            .filter(|id| {
                !response.successful.contains_key(id) && !response.failed.contains_key(id)
            })
            .collect();
        return Err(HubError::Aggregation(format!(
            "no outcome for requested servers {missing:?}"
        )));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(server_id: ServerId) -> ServerOutcome {
        ServerOutcome::Success(ServerSuccess {
            server_id,
            endpoint: format!("http://srv{server_id}.example/rpc/api"),
            response: json!("ok"),
        })
    }

    fn failure(server_id: ServerId, reason: FailureReason) -> ServerOutcome {
        ServerOutcome::Failure(ServerFailure {
            server_id,
            endpoint: format!("http://srv{server_id}.example/rpc/api"),
            reason,
        })
    }

    #[test]
    fn partitions_cover_requested_set() {
        let requested = vec![1, 2, 3];
        let outcomes = vec![
            success(1),
            failure(2, FailureReason::Timeout),
            success(3),
        ];

        let response = aggregate(&requested, outcomes).unwrap();
        assert_eq!(response.len(), 3);
        assert!(response.successful.contains_key(&1));
        assert!(response.successful.contains_key(&3));
        assert!(response.failed.contains_key(&2));
        assert_eq!(response.failed[&2].reason, FailureReason::Timeout);

        // The two sides are disjoint by construction of the maps.
        for id in response.successful.keys() {
            assert!(!response.failed.contains_key(id));
        }
    }

    #[test]
    fn rejects_foreign_server_identity() {
        let requested = vec![1, 2];
        let outcomes = vec![success(1), success(2), success(99)];

        let err = aggregate(&requested, outcomes).unwrap_err();
        assert!(matches!(err, HubError::Aggregation(_)));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn rejects_duplicate_outcome() {
        let requested = vec![1];
        let outcomes = vec![success(1), failure(1, FailureReason::Timeout)];

        let err = aggregate(&requested, outcomes).unwrap_err();
        assert!(matches!(err, HubError::Aggregation(_)));
    }

    #[test]
    fn rejects_missing_server() {
        let requested = vec![1, 2];
        let outcomes = vec![success(1)];

        let err = aggregate(&requested, outcomes).unwrap_err();
        assert!(matches!(err, HubError::Aggregation(_)));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn empty_request_empty_response() {
        let response = aggregate(&[], vec![]).unwrap();
        assert!(response.is_empty());
        assert!(response.is_complete_success());
    }

    #[test]
    fn complete_success_flag() {
        let response = aggregate(&[1], vec![success(1)]).unwrap();
        assert!(response.is_complete_success());

        let response = aggregate(&[1], vec![failure(1, FailureReason::MissingCredentials)]).unwrap();
        assert!(!response.is_complete_success());
    }
}
