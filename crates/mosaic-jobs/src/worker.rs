//! Worker pool for processing jobs.

use crate::config::JobsConfig;
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobContext, JobEvent, JobId, JobStatus};
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::queue::{JobQueue, JobReceiver};
use crate::retry::RetryPolicy;
use crate::scheduler::{RetryCommand, RetryScheduler};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Capacity of the outcome event channel; slow subscribers lag, they never
/// block workers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,

    /// Capacity of the bounded work queue.
    pub queue_capacity: usize,

    /// Optional ceiling on a single attempt.
    pub job_timeout: Option<Duration>,

    /// Delay policy for failed attempts.
    pub retry_policy: RetryPolicy,

    /// Retry scheduler tick interval.
    pub retry_tick: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for WorkerPoolConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            concurrency: config.worker.concurrency,
            queue_capacity: config.queue.capacity,
            job_timeout: config.worker.job_timeout(),
            retry_policy: config.retry.policy(),
            retry_tick: config.retry.tick(),
        }
    }
}

/// Caller-supplied work performed for each job.
#[async_trait]
pub trait JobExecutor<P: Send + Sync>: Send + Sync {
    /// Run one attempt.
    async fn execute(&self, payload: &P, ctx: JobContext) -> JobResult<()>;
}

/// Adapter turning an async closure into a [`JobExecutor`].
pub struct FnExecutor<P, F> {
    f: F,
    _payload: PhantomData<fn(P)>,
}

/// Wraps `f` so it can be handed to a [`WorkerPool`].
pub fn executor_fn<P, F, Fut>(f: F) -> FnExecutor<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult<()>> + Send + 'static,
{
    FnExecutor {
        f,
        _payload: PhantomData,
    }
}

#[async_trait]
impl<P, F, Fut> JobExecutor<P> for FnExecutor<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(P, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult<()>> + Send + 'static,
{
    async fn execute(&self, payload: &P, ctx: JobContext) -> JobResult<()> {
        (self.f)(payload.clone(), ctx).await
    }
}

/// Observational snapshot of a worker pool.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured concurrency.
    pub worker_count: usize,

    /// Jobs currently buffered in the work queue.
    pub queued_count: usize,

    /// Jobs waiting in the retry scheduler.
    pub retry_pending_count: usize,

    /// Jobs that completed successfully.
    pub jobs_succeeded: u64,

    /// Jobs dropped as permanent failures.
    pub jobs_failed: u64,
}

/// State shared by every worker task.
struct WorkerShared<P: Send + Sync + 'static> {
    receiver: JobReceiver<P>,
    executor: Arc<dyn JobExecutor<P>>,
    retry_tx: mpsc::UnboundedSender<RetryCommand<P>>,
    events: broadcast::Sender<JobEvent>,
    retry_policy: RetryPolicy,
    job_timeout: Option<Duration>,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
}

/// Fixed-size pool of workers pulling from one bounded queue.
///
/// The lifecycle is one-shot: `start` once, `stop` once.
pub struct WorkerPool<P: Send + Sync + 'static> {
    /// Unique pool ID.
    id: String,

    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Producer side of the work queue.
    queue: JobQueue<P>,

    /// State handed to workers.
    shared: Arc<WorkerShared<P>>,

    /// Taken by `start` to build the retry scheduler.
    retry_rx: Mutex<Option<mpsc::UnboundedReceiver<RetryCommand<P>>>>,

    /// Written only by the retry scheduler.
    retry_pending: Arc<AtomicUsize>,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,

    /// Running flag.
    running: AtomicBool,

    /// Worker and scheduler tasks.
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: Send + Sync + 'static> WorkerPool<P> {
    /// Create a new worker pool. Jobs may be submitted before `start`.
    pub fn new(config: WorkerPoolConfig, executor: Arc<dyn JobExecutor<P>>) -> JobResult<Self> {
        if config.concurrency == 0 {
            return Err(JobError::Configuration(
                "Worker pool concurrency must be greater than zero".to_string(),
            ));
        }
        if config.retry_tick.is_zero() {
            return Err(JobError::Configuration(
                "Retry scheduler tick must be greater than zero".to_string(),
            ));
        }

        let (queue, receiver) = JobQueue::bounded(config.queue_capacity)?;
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(WorkerShared {
            receiver,
            executor,
            retry_tx,
            events,
            retry_policy: config.retry_policy.clone(),
            job_timeout: config.job_timeout,
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        });

        Ok(Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            config,
            queue,
            shared,
            retry_rx: Mutex::new(Some(retry_rx)),
            retry_pending: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            running: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the workers and the retry scheduler.
    pub fn start(&self) -> JobResult<()> {
        let Some(retry_rx) = self.retry_rx.lock().take() else {
            return Err(JobError::AlreadyRunning);
        };
        self.running.store(true, Ordering::SeqCst);

        info!(
            pool_id = %self.id,
            concurrency = self.config.concurrency,
            queue_capacity = self.config.queue_capacity,
            "Starting worker pool"
        );
        WorkerMetrics::update_concurrency(&self.id, self.config.concurrency);

        let mut handles = self.handles.lock();

        let scheduler = RetryScheduler::new(
            self.queue.clone(),
            retry_rx,
            self.config.retry_tick,
            Arc::clone(&self.retry_pending),
        );
        handles.push(tokio::spawn(
            scheduler
                .run(self.shutdown_tx.subscribe())
                .instrument(tracing::info_span!("retry_scheduler", pool_id = %self.id)),
        ));

        for index in 0..self.config.concurrency {
            let worker_id = format!("{}-{}", self.id, index);
            let shared = Arc::clone(&self.shared);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let span = tracing::info_span!("worker", worker_id = %worker_id);
            handles.push(tokio::spawn(
                run_worker(shared, worker_id, shutdown_rx).instrument(span),
            ));
        }

        Ok(())
    }

    /// Signal every worker to finish its in-flight job and exit, and wait
    /// until they have. Buffered jobs that were never picked up are dropped.
    pub async fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!(pool_id = %self.id, "Stopping worker pool...");
        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut *self.handles.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(pool_id = %self.id, error = %e, "Worker task panicked");
            }
        }

        let abandoned = self.shared.receiver.drain().await;
        if !abandoned.is_empty() {
            warn!(
                pool_id = %self.id,
                abandoned = abandoned.len(),
                "Dropping queued jobs on shutdown"
            );
        }
        JobMetrics::update_queue_depth(0);

        self.running.store(false, Ordering::SeqCst);

        info!(
            pool_id = %self.id,
            succeeded = self.shared.jobs_succeeded.load(Ordering::Relaxed),
            failed = self.shared.jobs_failed.load(Ordering::Relaxed),
            "Worker pool stopped"
        );
    }

    /// Enqueue a job without blocking; fails with `QueueFull` at capacity.
    pub fn submit(&self, job: Job<P>) -> JobResult<JobId> {
        self.queue.submit(job)
    }

    /// Producer handle for callers that only need to submit.
    pub fn queue(&self) -> JobQueue<P> {
        self.queue.clone()
    }

    /// Subscribe to job outcome events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// Remove a job from the retry scheduler so it is not attempted again.
    ///
    /// Returns false if no retry was pending for `job_id`. An attempt that
    /// is already running is unaffected.
    pub async fn cancel_retry(&self, job_id: &JobId) -> bool {
        if !self.is_running() {
            return false;
        }

        let (reply, answer) = oneshot::channel();
        let command = RetryCommand::Cancel {
            job_id: job_id.clone(),
            reply,
        };
        if self.shared.retry_tx.send(command).is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            worker_count: self.config.concurrency,
            queued_count: self.queue.len(),
            retry_pending_count: self.retry_pending.load(Ordering::SeqCst),
            jobs_succeeded: self.shared.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.shared.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker<P: Send + Sync + 'static>(
    shared: Arc<WorkerShared<P>>,
    worker_id: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!("Worker started");

    loop {
        let job = tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            job = shared.receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        // In-flight work is never interrupted by shutdown.
        process_job(&shared, &worker_id, job).await;
    }

    debug!("Worker stopped");
}

async fn process_job<P: Send + Sync + 'static>(
    shared: &WorkerShared<P>,
    worker_id: &str,
    mut job: Job<P>,
) {
    let attempt = job.begin_attempt();
    let ctx = job.to_context(worker_id);

    debug!(
        job_id = %job.id,
        attempt,
        max_attempts = ctx.max_attempts,
        "Processing job"
    );

    let started = Instant::now();
    let execution = shared.executor.execute(&job.payload, ctx);
    let result = match shared.job_timeout {
        Some(limit) => timeout(limit, execution)
            .await
            .unwrap_or(Err(JobError::Timeout(limit))),
        None => execution.await,
    };
    let elapsed = started.elapsed();

    match result {
        Ok(()) => {
            JobMetrics::job_completed(elapsed);
            shared.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                job_id = %job.id,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job completed"
            );
            let _ = shared.events.send(JobEvent::from_job(&job, JobStatus::Succeeded));
        }
        Err(e) => {
            JobMetrics::job_failed(e.kind(), elapsed);
            job.record_failure(&e);

            if e.is_retryable() && job.can_retry() {
                let delay = shared.retry_policy.delay_for_attempt(attempt);
                let next_retry_at = job.schedule_retry(delay, Utc::now());
                warn!(
                    job_id = %job.id,
                    attempt,
                    max_attempts = job.max_attempts(),
                    error = %e,
                    next_retry_at = %next_retry_at,
                    "Job attempt failed, retry scheduled"
                );
                JobMetrics::job_retried(attempt);

                let event = JobEvent::from_job(&job, JobStatus::RetryScheduled);
                match shared.retry_tx.send(RetryCommand::Schedule(job)) {
                    Ok(()) => {
                        let _ = shared.events.send(event);
                    }
                    Err(mpsc::error::SendError(command)) => {
                        if let RetryCommand::Schedule(job) = command {
                            error!(
                                job_id = %job.id,
                                "Retry scheduler unavailable, dropping job"
                            );
                            fail_permanently(shared, &job, "scheduler_unavailable");
                        }
                    }
                }
            } else {
                let reason = if e.is_retryable() { "exhausted" } else { "fatal" };
                error!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    error = %e,
                    reason,
                    "Job failed permanently"
                );
                fail_permanently(shared, &job, reason);
            }
        }
    }
}

fn fail_permanently<P: Send + Sync + 'static>(
    shared: &WorkerShared<P>,
    job: &Job<P>,
    reason: &'static str,
) {
    JobMetrics::job_dropped(reason);
    shared.jobs_failed.fetch_add(1, Ordering::Relaxed);
    let _ = shared.events.send(JobEvent::from_job(job, JobStatus::Failed));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_executor() -> Arc<dyn JobExecutor<u32>> {
        Arc::new(executor_fn(|_payload: u32, _ctx| async { Ok(()) }))
    }

    fn config(concurrency: usize, capacity: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            concurrency,
            queue_capacity: capacity,
            job_timeout: None,
            retry_policy: RetryPolicy::fixed(Duration::from_millis(10)),
            retry_tick: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_worker_pool_config_from_jobs_config() {
        let jobs = JobsConfig::default();
        let config = WorkerPoolConfig::from(&jobs);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.retry_tick, Duration::from_secs(30));
        assert_eq!(config.retry_policy, RetryPolicy::default());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = WorkerPool::new(config(0, 1), noop_executor());
        assert!(matches!(result, Err(JobError::Configuration(_))));
    }

    #[test]
    fn test_zero_retry_tick_rejected() {
        let mut cfg = config(1, 1);
        cfg.retry_tick = Duration::ZERO;
        let result = WorkerPool::new(cfg, noop_executor());
        assert!(matches!(result, Err(JobError::Configuration(_))));
    }

    #[test]
    fn test_stats_before_start() {
        let pool = WorkerPool::new(config(3, 2), noop_executor()).unwrap();
        pool.submit(Job::new(1)).unwrap();

        let stats = pool.stats();
        assert!(!stats.running);
        assert_eq!(stats.worker_count, 3);
        assert_eq!(stats.queued_count, 1);
        assert_eq!(stats.retry_pending_count, 0);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let pool = WorkerPool::new(config(1, 1), noop_executor()).unwrap();
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(JobError::AlreadyRunning)));
        pool.stop().await;
        assert!(!pool.is_running());
        assert!(matches!(pool.start(), Err(JobError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_job_timeout_counts_as_failure() {
        let executor: Arc<dyn JobExecutor<u32>> =
            Arc::new(executor_fn(|_payload: u32, _ctx| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }));
        let mut cfg = config(1, 1);
        cfg.job_timeout = Some(Duration::from_millis(20));
        let pool = WorkerPool::new(cfg, executor).unwrap();
        let mut events = pool.subscribe();

        pool.submit(Job::new(7).max_retries(0)).unwrap();
        pool.start().unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.status, JobStatus::Failed);
        assert!(event.error.unwrap().contains("timed out"));
        pool.stop().await;
    }
}
