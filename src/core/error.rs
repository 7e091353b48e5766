//! Guard error types

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while authorizing or supervising tool calls
///
/// Policy denials are not errors: they are returned as
/// [`AuthorizationDecision`](crate::authorization::AuthorizationDecision) values.
#[derive(Error, Debug)]
pub enum GuardError {
    /// No background job with this ID is known to the session
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A blocking call exceeded its maximum duration
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The caller (or the request itself) was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Channel closed unexpectedly (e.g. the authorization actor stopped)
    #[error("Channel closed")]
    ChannelClosed,

    /// The authorization actor could not determine an answer
    #[error("Authorization evaluation failed: {0}")]
    Evaluation(String),

    /// The OS sandbox could not be applied in strict mode
    #[error("Sandbox enforcement failed: {0}")]
    SandboxEnforcement(String),

    /// Tool is not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Request parameters are missing or malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The safety judge failed to produce a verdict
    #[error("Safety judge error: {0}")]
    Judge(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl GuardError {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        GuardError::Other(msg.into())
    }

    /// Create an evaluation failure
    pub fn evaluation(msg: impl Into<String>) -> Self {
        GuardError::Evaluation(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        GuardError::InvalidInput(msg.into())
    }

    /// Whether this error means the caller stopped waiting (timeout or cancellation)
    pub fn is_timeout(&self) -> bool {
        matches!(self, GuardError::Timeout(_) | GuardError::Cancelled)
    }
}

/// Result type alias for guard operations
pub type GuardResult<T> = Result<T, GuardError>;
