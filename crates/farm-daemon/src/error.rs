//! Error types for farm-daemon

use thiserror::Error;

/// Startup errors. These are the only errors that end the process.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Container runtime unavailable
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Failure to obtain desired state from the control plane.
///
/// Covers transport failures, timeouts, non-2xx answers and malformed
/// payloads. The poll loop treats every variant as "nothing to do".
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request could not be sent or timed out
    #[error("Transport error: {0}")]
    Transport(String),

    /// Control plane answered with a non-success status
    #[error("Control plane returned HTTP {status}")]
    Status { status: u16 },

    /// Payload was not a valid record list
    #[error("Malformed payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Failure of a single runtime operation
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// Runtime API call failed
    #[error("Runtime API error: {0}")]
    Api(String),

    /// Runtime call exceeded its time budget
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Instance does not exist
    #[error("Instance not found: {0}")]
    NotFound(String),

    /// Instance name already taken
    #[error("Instance already exists: {0}")]
    Conflict(String),
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => RuntimeError::Conflict(message),
            other => RuntimeError::Api(other.to_string()),
        }
    }
}

/// Result type alias for daemon startup
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for control-plane fetches
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
