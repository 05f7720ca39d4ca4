//! Retry scheduler.
//!
//! A single task owns the list of jobs waiting for another attempt. Workers
//! and the pool talk to it only through [`RetryCommand`] messages, and it
//! feeds due jobs back into the bounded work queue, so the list itself never
//! needs a lock.

use crate::job::{Job, JobId};
use crate::metrics::JobMetrics;
use crate::queue::JobQueue;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Message sent to the retry scheduler.
pub enum RetryCommand<P> {
    /// Hold a failed job until its `next_retry_at`.
    Schedule(Job<P>),

    /// Forget every pending retry with this id; replies whether any existed.
    Cancel {
        job_id: JobId,
        reply: oneshot::Sender<bool>,
    },
}

/// Counts from one release pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Jobs pushed back into the work queue.
    pub released: usize,
    /// Due jobs kept because the work queue was full.
    pub deferred: usize,
    /// Due jobs lost because the work queue was closed.
    pub dropped: usize,
}

/// Single-owner holder of jobs awaiting retry.
pub struct RetryScheduler<P> {
    pending: Vec<Job<P>>,
    queue: JobQueue<P>,
    commands: mpsc::UnboundedReceiver<RetryCommand<P>>,
    tick: Duration,
    pending_gauge: Arc<AtomicUsize>,
}

impl<P: Send + 'static> RetryScheduler<P> {
    /// Create a scheduler feeding `queue`.
    ///
    /// `pending_gauge` is written only by this scheduler and lets other
    /// tasks read the pending count without touching the list.
    pub fn new(
        queue: JobQueue<P>,
        commands: mpsc::UnboundedReceiver<RetryCommand<P>>,
        tick: Duration,
        pending_gauge: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            pending: Vec::new(),
            queue,
            commands,
            tick,
            pending_gauge,
        }
    }

    /// Number of jobs waiting for a retry.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn publish_pending(&self) {
        self.pending_gauge.store(self.pending.len(), Ordering::SeqCst);
        JobMetrics::update_retry_pending(self.pending.len());
    }

    fn handle(&mut self, command: RetryCommand<P>) {
        match command {
            RetryCommand::Schedule(job) => {
                debug!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    next_retry_at = ?job.next_retry_at,
                    "Retry scheduled"
                );
                self.pending.push(job);
            }
            RetryCommand::Cancel { job_id, reply } => {
                let before = self.pending.len();
                self.pending.retain(|job| job.id != job_id);
                let removed = before != self.pending.len();
                if removed {
                    info!(job_id = %job_id, "Pending retry cancelled");
                }
                let _ = reply.send(removed);
            }
        }
        self.publish_pending();
    }

    /// Move every job due at `now` into the work queue.
    ///
    /// Each job is taken out of the pending list before the push; a push
    /// rejected for lack of space hands the job back and it stays pending
    /// for the next tick.
    pub fn release_due(&mut self, now: DateTime<Utc>) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for job in std::mem::take(&mut self.pending) {
            if !job.is_due(now) {
                still_pending.push(job);
                continue;
            }

            let job_id = job.id.clone();
            match self.queue.requeue(job) {
                Ok(()) => {
                    debug!(job_id = %job_id, "Retry released to work queue");
                    summary.released += 1;
                }
                Err(TrySendError::Full(job)) => {
                    summary.deferred += 1;
                    still_pending.push(job);
                }
                Err(TrySendError::Closed(job)) => {
                    error!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        "Work queue closed, dropping pending retry"
                    );
                    summary.dropped += 1;
                }
            }
        }

        self.pending = still_pending;
        self.publish_pending();

        if summary.deferred > 0 {
            warn!(
                deferred = summary.deferred,
                "Work queue full, retries deferred to next tick"
            );
        }

        summary
    }

    /// Run until `shutdown` fires or every command sender is gone.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(tick = ?self.tick, "Starting retry scheduler");

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    debug!("Retry scheduler received shutdown signal");
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },

                _ = ticker.tick() => {
                    self.release_due(Utc::now());
                }
            }
        }

        if !self.pending.is_empty() {
            warn!(
                dropped = self.pending.len(),
                "Retry scheduler stopped with pending retries; they are lost"
            );
        }
        self.pending.clear();
        self.publish_pending();
        info!("Retry scheduler stopped");
    }
}
