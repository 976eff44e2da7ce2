use thiserror::Error;

use crate::core::activity::ActivityName;

/// Errors raised while talking to the engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The engine could not be reached when dialing.
    #[error("unable to connect to {host_port}: {source}")]
    Connect {
        host_port: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode engine response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The engine refused the request (unknown run, duplicate start, ...).
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The workflow run closed with a failure.
    #[error("workflow execution failed: {0}")]
    WorkflowFailed(String),
}

/// Error returned by an activity handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    #[error("{0}")]
    Application(String),
}

/// Error returned by a workflow handler or by activity calls made from it.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("activity {name} failed: {message}")]
    ActivityFailed { name: ActivityName, message: String },

    #[error("activity {0} timed out")]
    ActivityTimedOut(ActivityName),

    #[error("activity {0} is not registered")]
    ActivityNotRegistered(ActivityName),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{0}")]
    Application(String),
}
