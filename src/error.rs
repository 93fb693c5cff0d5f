//! Error types for the orchestration core.
//!
//! Every domain-rule violation is synchronous and caller-visible: a missing
//! plan or execution is `NotFound`, a bad action name or missing required
//! field is `InvalidArgument`, and an illegal transition is
//! `PreconditionFailed`. None of these are retried internally; retry is
//! either an explicit operator action or the correction loop in
//! [`crate::retry`].

use thiserror::Error;

/// Error type shared by the planner, engine, store, and retry loop.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A plan, execution, task, rule, or chain could not be resolved
    #[error("not found: {0}")]
    NotFound(String),

    /// A bad action name, malformed id, or missing required field
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A transition that is not legal from the current state
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// File I/O errors from the document store
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML catalog parsing errors
    #[error("catalog error: {0}")]
    Catalog(#[from] serde_yaml::Error),

    /// An external collaborator (executor or correction oracle) failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a precondition-failed error
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
