//! Newline-delimited JSON job intake.

use mosaic_jobs::{Job, JobError, JobQueue};
use mosaic_render::RenderJob;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// One input line: a render job with optional job settings.
#[derive(Debug, Deserialize)]
pub struct JobLine {
    /// Caller-chosen job id; a random one is used when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Per-job retry ceiling override.
    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(flatten)]
    pub job: RenderJob,
}

impl JobLine {
    /// Parses a single line.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Turns the line into a queue job.
    pub fn into_job(self, default_max_retries: u32) -> Job<RenderJob> {
        let job = match self.id {
            Some(id) => Job::with_id(id, self.job),
            None => Job::new(self.job),
        };
        job.max_retries(self.max_retries.unwrap_or(default_max_retries))
    }
}

/// Counts from one intake run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub invalid: usize,
}

/// Reads jobs from `reader` until EOF and submits each to `queue`.
///
/// Malformed lines and queue rejections are logged and counted; they never
/// stop the intake.
pub async fn submit_lines<R>(
    reader: R,
    queue: &JobQueue<RenderJob>,
    default_max_retries: u32,
) -> IntakeSummary
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IntakeSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read job input, stopping intake");
                break;
            }
        };
        line_no += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parsed = JobLine::parse(trimmed)
            .map_err(|e| e.to_string())
            .and_then(|line| {
                line.job
                    .request
                    .validate()
                    .map(|()| line)
                    .map_err(|e| e.to_string())
            });
        let line = match parsed {
            Ok(line) => line,
            Err(e) => {
                warn!(line = line_no, error = %e, "Invalid job line skipped");
                summary.invalid += 1;
                continue;
            }
        };

        match queue.submit(line.into_job(default_max_retries)) {
            Ok(job_id) => {
                debug!(line = line_no, job_id = %job_id, "Job accepted");
                summary.accepted += 1;
            }
            Err(JobError::QueueFull { capacity }) => {
                warn!(line = line_no, capacity, "Queue full, job rejected");
                summary.rejected += 1;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Job rejected");
                summary.rejected += 1;
            }
        }
    }

    summary
}
