//! Job error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// The bounded queue has no free slot.
    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The queue no longer accepts work.
    #[error("Job queue is shutting down")]
    ShuttingDown,

    /// `start` was called on a pool that is running or already stopped.
    #[error("Worker pool already started")]
    AlreadyRunning,

    /// Job execution failed.
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Job timed out.
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    /// Job was cancelled.
    #[error("Job was cancelled")]
    Cancelled,

    /// A required input does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The job payload is malformed.
    #[error("Invalid job input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if a failed attempt with this error may be retried.
    ///
    /// Precondition failures (`NotFound`, `InvalidInput`) surface on the
    /// first attempt without consuming a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::ExecutionFailed(_) | JobError::Timeout(_) | JobError::Internal(_)
        )
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::QueueFull { .. } => "queue_full",
            JobError::ShuttingDown => "shutting_down",
            JobError::AlreadyRunning => "already_running",
            JobError::ExecutionFailed(_) => "execution_failed",
            JobError::Timeout(_) => "timeout",
            JobError::Cancelled => "cancelled",
            JobError::NotFound(_) => "not_found",
            JobError::InvalidInput(_) => "invalid_input",
            JobError::Configuration(_) => "configuration",
            JobError::Internal(_) => "internal",
        }
    }
}
