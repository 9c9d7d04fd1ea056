use thiserror::Error;

use crate::state::RunStatus;
use crate::state::TransitionError;

/// A single stream frame that could not be turned into an event.
///
/// Always recovered locally: the decoder logs it, counts it and moves on.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is not valid utf-8")]
    Utf8,
    #[error("frame exceeds {limit} bytes ({size} bytes)")]
    Oversized { size: usize, limit: usize },
    #[error("invalid event payload: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
}

/// Connection-level failures. These invalidate the run's continuation.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("invalid response body: {0}")]
    Body(String),
}

/// Rejected before any network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("a credential is required by the configured backend")]
    CredentialRequired,
}

/// Manual action failures. Scoped to one action attempt; never change the run status.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("no active session")]
    NoSession,
    #[error("run is {0:?}; manual actions are only accepted between turns")]
    Busy(RunStatus),
    #[error("another manual action is still in flight")]
    ActionInFlight,
    #[error("task already finished ({0})")]
    TaskFinished(String),
    #[error("{action} requires coordinates")]
    MissingCoordinates { action: &'static str },
    #[error("{action} does not take coordinates")]
    UnexpectedCoordinates { action: &'static str },
    #[error("{action} is not available in the current game state")]
    NotAllowed { action: &'static str },
    #[error("run was replaced before the action completed")]
    Superseded,
    #[error("action request failed: {0}")]
    Transport(#[from] TransportError),
}

/// Errors surfaced by the run controller's public operations.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("manual action rejected: {0}")]
    Gateway(#[from] GatewayError),
    #[error("illegal state change: {0}")]
    Transition(#[from] TransitionError),
    #[error("cannot continue: {0}")]
    NotResumable(String),
}

/// Top-level failure of a CLI command.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("run failed: {0}")]
    Run(#[from] RunError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("replay failed: {0}")]
    Replay(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
