//! Error types for the render pipeline.

use crate::cleanup::CleanupReport;
use mosaic_jobs::JobError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Render pipeline errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The request failed validation.
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    /// Renderer settings are unusable.
    #[error("Invalid renderer configuration: {0}")]
    Configuration(String),

    /// A required input does not exist.
    #[error("{kind} not found: {}", .path.display())]
    NotFound { kind: &'static str, path: PathBuf },

    /// The renderer process could not be launched.
    #[error("Failed to launch renderer: {0}")]
    Spawn(#[source] io::Error),

    /// The renderer exceeded its deadline and was killed.
    #[error("Renderer timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled and the renderer was killed.
    #[error("Renderer run was cancelled")]
    Cancelled,

    /// The renderer exited unsuccessfully.
    #[error("Renderer exited with code {}: {stderr}", .exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The archive could not be produced.
    #[error("Failed to build archive: {0}")]
    Archive(String),

    /// The archive could not be handed to storage.
    #[error("Failed to persist archive: {0}")]
    Sink(String),

    /// One or more temporary paths could not be removed.
    #[error("Cleanup failed for {} path(s)", .0.failures.len())]
    Cleanup(CleanupReport),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RenderError {
    pub(crate) fn not_found(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            kind,
            path: path.into(),
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration",
            Self::NotFound { .. } => "not_found",
            Self::Spawn(_) => "spawn",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::Archive(_) => "archive",
            Self::Sink(_) => "sink",
            Self::Cleanup(_) => "cleanup",
            Self::Io(_) => "io",
        }
    }
}

impl From<RenderError> for JobError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::InvalidRequest(msg) => JobError::InvalidInput(msg),
            RenderError::Configuration(msg) => JobError::Configuration(msg),
            e @ RenderError::NotFound { .. } => JobError::NotFound(e.to_string()),
            RenderError::Timeout(limit) => JobError::Timeout(limit),
            RenderError::Cancelled => JobError::Cancelled,
            e @ RenderError::Cleanup(_) => JobError::Internal(e.to_string()),
            e => JobError::ExecutionFailed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_errors_are_fatal() {
        let job_err: JobError = RenderError::not_found("image", "/tmp/missing.png").into();
        assert!(matches!(job_err, JobError::NotFound(_)));
        assert!(!job_err.is_retryable());

        let job_err: JobError = RenderError::InvalidRequest("stones_x".to_string()).into();
        assert!(!job_err.is_retryable());
    }

    #[test]
    fn test_runtime_errors_are_retryable() {
        let timeout: JobError = RenderError::Timeout(Duration::from_secs(600)).into();
        assert!(timeout.is_retryable());

        let failed: JobError = RenderError::ExecutionFailed {
            exit_code: Some(1),
            stderr: "bad palette".to_string(),
        }
        .into();
        assert!(failed.is_retryable());
        assert!(failed.to_string().contains("bad palette"));

        let sink: JobError = RenderError::Sink("bucket unavailable".to_string()).into();
        assert!(sink.is_retryable());
    }

    #[test]
    fn test_configuration_error_is_fatal() {
        let err = RenderError::Configuration("renderer.command must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid renderer configuration: renderer.command must not be empty"
        );
        let job_err: JobError = err.into();
        assert!(matches!(job_err, JobError::Configuration(_)));
        assert!(!job_err.is_retryable());
    }

    #[test]
    fn test_cancel_is_not_retried() {
        let job_err: JobError = RenderError::Cancelled.into();
        assert!(!job_err.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RenderError::not_found("renderer script", "/opt/mosaic.py");
        assert_eq!(err.to_string(), "renderer script not found: /opt/mosaic.py");
        assert_eq!(err.kind(), "not_found");

        let err = RenderError::ExecutionFailed {
            exit_code: None,
            stderr: "killed".to_string(),
        };
        assert_eq!(err.to_string(), "Renderer exited with code none: killed");
    }
}
