use thiserror::Error;

/// Errors produced by the hubcast gateway layer.
///
/// These cover session-level faults only. Per-server failures during attach
/// or fan-out are data, not errors: they land in the failed partition of the
/// fan-out response and never abort the sibling calls.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("aggregation error: {0}")]
    Aggregation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type HubResult<T> = Result<T, HubError>;
