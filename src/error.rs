//! Error types shared across the engine.
//!
//! Every collaborator boundary (the activity invoker, C2) reclassifies whatever
//! error a collaborator raises into one of these kinds before it reaches workflow
//! code. The engine never lets a collaborator's native error type leak into a
//! workflow definition.

use thiserror::Error;

/// Result type used throughout the engine.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Error kinds recognized by the retry policy and the workflow engine.
///
/// `TransientCollaborator` and `Timeout` are retryable (subject to the step's
/// [`crate::workflow::retry::RetryPolicy`] budget); the rest are not.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    /// A collaborator call failed in a way that is expected to succeed on retry
    /// (network error, 5xx, connection reset).
    #[error("transient collaborator error: {0}")]
    TransientCollaborator(String),

    /// A collaborator call failed in a way retrying will not fix (4xx other than
    /// 408/429, schema violation).
    #[error("permanent collaborator error: {0}")]
    PermanentCollaborator(String),

    /// An attempt exceeded its start-to-close or heartbeat timeout. Treated as
    /// transient unless the step's retry budget is exhausted.
    #[error("operation timed out")]
    Timeout,

    /// The enclosing workflow run was cancelled while this step was in flight.
    /// Terminal for the step.
    #[error("cancelled")]
    Cancelled,

    /// The input to a step or to the orchestrator was malformed. Permanent; the
    /// run ends in `failed` with no retry.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An unexpected failure inside the engine itself (persistence layer,
    /// serialization, logic error). Surfaced as transient with an alert.
    #[error("engine internal error: {0}")]
    EngineInternal(String),

    /// An advisory condition (alias collision, unknown currency). Logged, never
    /// fatal by itself.
    #[error("data quality warning: {0}")]
    DataQuality(String),

    /// The requested run/case/workflow was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested operation conflicts with the current state (e.g. cancelling
    /// an already-terminal run).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The orchestrator is at capacity; the caller should retry with backoff.
    #[error("overloaded")]
    Overloaded,
}

impl WorkflowError {
    /// Whether this error kind is retryable in principle (ignoring attempt
    /// budgets and the policy's non-retryable-error list).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::TransientCollaborator(_)
                | WorkflowError::Timeout
                | WorkflowError::EngineInternal(_)
        )
    }

    /// A short, stable tag for metrics labels and log fields.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            WorkflowError::TransientCollaborator(_) => "transient_collaborator",
            WorkflowError::PermanentCollaborator(_) => "permanent_collaborator",
            WorkflowError::Timeout => "timeout",
            WorkflowError::Cancelled => "cancelled",
            WorkflowError::InvalidInput(_) => "invalid_input",
            WorkflowError::EngineInternal(_) => "engine_internal",
            WorkflowError::DataQuality(_) => "data_quality",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Overloaded => "overloaded",
        }
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::EngineInternal(err.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::EngineInternal(format!("serialization error: {err}"))
    }
}

impl From<sled::Error> for WorkflowError {
    fn from(err: sled::Error) -> Self {
        WorkflowError::EngineInternal(format!("history store error: {err}"))
    }
}
