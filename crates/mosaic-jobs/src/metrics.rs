//! Metrics for job queue monitoring.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the binary.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job system.
pub mod names {
    /// Total jobs accepted by the queue.
    pub const JOBS_SUBMITTED_TOTAL: &str = "mosaic_jobs_submitted_total";
    /// Total jobs rejected because the queue was full.
    pub const JOBS_REJECTED_TOTAL: &str = "mosaic_jobs_rejected_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "mosaic_jobs_completed_total";
    /// Total failed attempts.
    pub const JOBS_FAILED_TOTAL: &str = "mosaic_jobs_failed_total";
    /// Total retries scheduled.
    pub const JOBS_RETRIED_TOTAL: &str = "mosaic_jobs_retried_total";
    /// Total jobs dropped after exhausting retries or failing fatally.
    pub const JOBS_DROPPED_TOTAL: &str = "mosaic_jobs_dropped_total";

    /// Current buffered jobs.
    pub const JOBS_QUEUED: &str = "mosaic_jobs_queued";
    /// Current jobs waiting for a retry.
    pub const JOBS_RETRY_PENDING: &str = "mosaic_jobs_retry_pending";

    /// Attempt duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "mosaic_job_duration_seconds";

    /// Worker pool concurrency.
    pub const WORKERS_CONCURRENCY: &str = "mosaic_workers_concurrency";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::JOBS_SUBMITTED_TOTAL,
        "Total number of jobs accepted by the queue"
    );
    describe_counter!(
        names::JOBS_REJECTED_TOTAL,
        "Total number of submissions rejected because the queue was full"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of failed job attempts"
    );
    describe_counter!(
        names::JOBS_RETRIED_TOTAL,
        "Total number of retries scheduled"
    );
    describe_counter!(
        names::JOBS_DROPPED_TOTAL,
        "Total number of jobs dropped as permanent failures"
    );

    describe_gauge!(names::JOBS_QUEUED, "Current number of buffered jobs");
    describe_gauge!(
        names::JOBS_RETRY_PENDING,
        "Current number of jobs waiting for a retry"
    );

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job attempt duration in seconds"
    );

    describe_gauge!(
        names::WORKERS_CONCURRENCY,
        "Worker pool concurrency setting"
    );
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job accepted by the queue.
    pub fn job_submitted() {
        counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
    }

    /// Record a job rejected by the queue.
    pub fn job_rejected() {
        counter!(names::JOBS_REJECTED_TOTAL).increment(1);
    }

    /// Record a successful attempt.
    pub fn job_completed(duration: Duration) {
        counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
        histogram!(names::JOB_DURATION_SECONDS, "status" => "completed")
            .record(duration.as_secs_f64());
    }

    /// Record a failed attempt.
    pub fn job_failed(error_kind: &'static str, duration: Duration) {
        counter!(names::JOBS_FAILED_TOTAL, "error_type" => error_kind).increment(1);
        histogram!(names::JOB_DURATION_SECONDS, "status" => "failed")
            .record(duration.as_secs_f64());
    }

    /// Record a retry handed to the scheduler.
    pub fn job_retried(attempt: u32) {
        counter!(names::JOBS_RETRIED_TOTAL, "attempt" => attempt.to_string()).increment(1);
    }

    /// Record a permanently failed job.
    pub fn job_dropped(reason: &'static str) {
        counter!(names::JOBS_DROPPED_TOTAL, "reason" => reason).increment(1);
    }

    /// Update the buffered job gauge.
    pub fn update_queue_depth(depth: usize) {
        gauge!(names::JOBS_QUEUED).set(depth as f64);
    }

    /// Update the pending retry gauge.
    pub fn update_retry_pending(pending: usize) {
        gauge!(names::JOBS_RETRY_PENDING).set(pending as f64);
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Update worker pool concurrency.
    pub fn update_concurrency(pool_id: &str, concurrency: usize) {
        gauge!(
            names::WORKERS_CONCURRENCY,
            "pool_id" => pool_id.to_string()
        )
        .set(concurrency as f64);
    }
}
