//! Bounded, non-blocking job queue.

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId};
use crate::metrics::JobMetrics;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Producer side of the bounded work queue.
///
/// Cloning is cheap; every clone feeds the same buffer.
pub struct JobQueue<P> {
    tx: mpsc::Sender<Job<P>>,
}

impl<P> Clone for JobQueue<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Consumer side of the work queue, shared by all workers.
pub struct JobReceiver<P> {
    rx: Arc<Mutex<mpsc::Receiver<Job<P>>>>,
}

impl<P> Clone for JobReceiver<P> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<P: Send + 'static> JobQueue<P> {
    /// Creates a queue holding at most `capacity` jobs.
    pub fn bounded(capacity: usize) -> JobResult<(Self, JobReceiver<P>)> {
        if capacity == 0 {
            return Err(JobError::Configuration(
                "Queue capacity must be greater than zero".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(capacity);
        Ok((
            Self { tx },
            JobReceiver {
                rx: Arc::new(Mutex::new(rx)),
            },
        ))
    }

    /// Enqueue a job without waiting.
    ///
    /// Fails with [`JobError::QueueFull`] when no slot is free.
    pub fn submit(&self, job: Job<P>) -> JobResult<JobId> {
        let job_id = job.id.clone();
        match self.tx.try_send(job) {
            Ok(()) => {
                debug!(job_id = %job_id, queued = self.len(), "Job submitted");
                JobMetrics::job_submitted();
                JobMetrics::update_queue_depth(self.len());
                Ok(job_id)
            }
            Err(TrySendError::Full(_)) => {
                warn!(job_id = %job_id, capacity = self.capacity(), "Queue full, job rejected");
                JobMetrics::job_rejected();
                Err(JobError::QueueFull {
                    capacity: self.capacity(),
                })
            }
            Err(TrySendError::Closed(_)) => Err(JobError::ShuttingDown),
        }
    }

    /// Hands a job back to the queue, returning it if no slot is free.
    pub(crate) fn requeue(&self, job: Job<P>) -> Result<(), TrySendError<Job<P>>> {
        self.tx.try_send(job)?;
        JobMetrics::update_queue_depth(self.len());
        Ok(())
    }

    /// Number of jobs currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Returns true if no job is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl<P: Send + 'static> JobReceiver<P> {
    /// Waits for the next job. Returns `None` once every producer is gone.
    pub async fn recv(&self) -> Option<Job<P>> {
        self.rx.lock().await.recv().await
    }

    /// Removes every buffered job without waiting.
    pub(crate) async fn drain(&self) -> Vec<Job<P>> {
        let mut rx = self.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(job) = rx.try_recv() {
            drained.push(job);
        }
        drained
    }
}
