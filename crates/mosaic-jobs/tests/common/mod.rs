//! Shared helpers for worker pool integration tests.

use mosaic_jobs::{JobEvent, JobId, JobStatus, RetryPolicy, WorkerPoolConfig};
use std::time::Duration;
use tokio::sync::broadcast;

/// Pool settings with millisecond retry timing.
pub fn fast_config(concurrency: usize, capacity: usize) -> WorkerPoolConfig {
    WorkerPoolConfig {
        concurrency,
        queue_capacity: capacity,
        job_timeout: None,
        retry_policy: RetryPolicy::fixed(Duration::from_millis(50)),
        retry_tick: Duration::from_millis(10),
    }
}

/// Waits for the terminal event of `job_id`, collecting every event seen
/// for it on the way.
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<JobEvent>,
    job_id: &JobId,
) -> Vec<JobEvent> {
    let mut seen = Vec::new();
    let wait = async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if &event.job_id != job_id {
                continue;
            }
            let done = event.status.is_terminal();
            seen.push(event);
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("job did not reach a terminal state in time");
    seen
}

/// Statuses of a sequence of events.
pub fn statuses(events: &[JobEvent]) -> Vec<JobStatus> {
    events.iter().map(|event| event.status).collect()
}
