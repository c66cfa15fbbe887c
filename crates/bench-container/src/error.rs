//! Error types for container operations.

use crate::lifecycle::ContainerState;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`ContainerRuntime`](crate::ContainerRuntime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to run `docker {command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`docker {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("`docker exec` session ended: {stderr}")]
    SessionClosed { stderr: String },

    #[error("No such container: {0}")]
    NotFound(String),

    #[error("Docker API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Docker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Docker API request failed: {0}")]
    Http(#[from] hyper_util::client::legacy::Error),

    #[error("Failed to read Docker API response: {0}")]
    Body(#[from] hyper::Error),

    #[error("Failed to decode Docker API response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RuntimeError {
    /// True when the runtime reported that the container does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            RuntimeError::NotFound(_) => true,
            RuntimeError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Errors raised by the [`ContainerLifecycle`](crate::ContainerLifecycle).
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Container '{name}' failed to start: {source}")]
    Startup {
        name: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Container '{name}' was not ready within {timeout:?}")]
    ReadinessTimeout { name: String, timeout: Duration },

    #[error("Container '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: ContainerState,
        to: ContainerState,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
