//! Job model and execution context.

use crate::error::JobError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Retry ceiling applied when the caller does not override it.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique job identifier.
///
/// Assigned by the caller and used for logging; two jobs may share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A unit of asynchronous, retryable work.
///
/// Owned by exactly one of the queue, a worker, or the retry scheduler at
/// any time, so attempts of the same job never overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<P> {
    /// Caller-assigned identifier.
    pub id: JobId,

    /// Data needed to perform the work.
    pub payload: P,

    /// Execution attempts so far. Never exceeds `max_retries + 1`.
    pub attempts: u32,

    /// Retry ceiling.
    pub max_retries: u32,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// Earliest time of the next attempt, set on each failure.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Error from the last failed attempt.
    pub last_error: Option<String>,
}

impl<P> Job<P> {
    /// Creates a job with a random id and the default retry ceiling.
    pub fn new(payload: P) -> Self {
        Self::with_id(JobId::new(), payload)
    }

    /// Creates a job with a caller-chosen id.
    pub fn with_id(id: impl Into<JobId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
            attempts: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
            next_retry_at: None,
            last_error: None,
        }
    }

    /// Overrides the retry ceiling.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Total attempts allowed (initial attempt plus retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Marks the start of a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Returns true if another attempt is allowed after the current one.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts()
    }

    /// Records the error of the failed attempt.
    pub fn record_failure(&mut self, error: &JobError) {
        self.last_error = Some(error.to_string());
    }

    /// Pushes `next_retry_at` forward by `delay` from `now` (or from the
    /// previous retry time if that is later) and returns the new value.
    pub fn schedule_retry(&mut self, delay: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
        let base = match self.next_retry_at {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        let next = base + ChronoDuration::from_std(delay).unwrap_or_default();
        self.next_retry_at = Some(next);
        next
    }

    /// Returns true if the job may run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }

    /// Create the execution context for the current attempt.
    pub fn to_context(&self, worker_id: &str) -> JobContext {
        JobContext {
            job_id: self.id.clone(),
            attempt: self.attempts,
            max_attempts: self.max_attempts(),
            started_at: Utc::now(),
            worker_id: worker_id.to_string(),
        }
    }
}

/// Job execution context.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,

    /// Current attempt number (1-based).
    pub attempt: u32,

    /// Maximum attempts allowed.
    pub max_attempts: u32,

    /// Attempt started at this time.
    pub started_at: DateTime<Utc>,

    /// Worker processing this job.
    pub worker_id: String,
}

impl JobContext {
    /// Returns true if this is the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns remaining attempts.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }
}

/// Observable job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Attempt failed; the job waits in the retry scheduler.
    RetryScheduled,
    /// Job completed successfully.
    Succeeded,
    /// Job failed permanently and was dropped.
    Failed,
}

impl JobStatus {
    /// Returns true for states after which the job no longer exists.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::RetryScheduled => write!(f, "retry_scheduled"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome notification published by the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Job ID.
    pub job_id: JobId,

    /// New status.
    pub status: JobStatus,

    /// Attempts made so far.
    pub attempts: u32,

    /// Error of the last attempt, if it failed.
    pub error: Option<String>,

    /// Next attempt time when a retry was scheduled.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// When the event was produced.
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub(crate) fn from_job<P>(job: &Job<P>, status: JobStatus) -> Self {
        Self {
            job_id: job.id.clone(),
            status,
            attempts: job.attempts,
            error: job.last_error.clone(),
            next_retry_at: job.next_retry_at,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_generation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new("payload");
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(job.max_attempts(), 4);
        assert!(job.next_retry_at.is_none());
        assert!(job.is_due(Utc::now()));
    }

    #[test]
    fn test_attempt_bound() {
        let mut job = Job::with_id("notify-1", ()).max_retries(2);
        let mut attempts = 0;
        loop {
            job.begin_attempt();
            attempts += 1;
            if !job.can_retry() {
                break;
            }
        }
        assert_eq!(attempts, 3);
        assert_eq!(job.attempts, job.max_retries + 1);
    }

    #[test]
    fn test_zero_retries_allows_single_attempt() {
        let mut job = Job::new(()).max_retries(0);
        job.begin_attempt();
        assert!(!job.can_retry());
    }

    #[test]
    fn test_schedule_retry_moves_forward() {
        let mut job = Job::new(());
        let now = Utc::now();
        let first = job.schedule_retry(Duration::from_secs(30), now);
        assert_eq!(first, now + ChronoDuration::seconds(30));
        assert!(!job.is_due(now));
        assert!(job.is_due(first));

        // A retry computed from an earlier clock never moves backwards.
        let second = job.schedule_retry(Duration::from_secs(30), now);
        assert!(second > first);
    }

    #[test]
    fn test_job_context() {
        let mut job = Job::new(());
        job.begin_attempt();
        let ctx = job.to_context("worker-1");

        assert_eq!(ctx.attempt, 1);
        assert_eq!(ctx.max_attempts, 4);
        assert_eq!(ctx.remaining_attempts(), 3);
        assert!(!ctx.is_last_attempt());
    }

    #[test]
    fn test_record_failure() {
        let mut job = Job::new(());
        job.record_failure(&JobError::ExecutionFailed("exit 2".into()));
        assert!(job.last_error.unwrap().contains("exit 2"));
    }

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::RetryScheduled.is_terminal());
        assert_eq!(JobStatus::RetryScheduled.to_string(), "retry_scheduled");
    }
}
