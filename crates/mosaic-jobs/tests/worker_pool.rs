//! Integration tests for the worker pool and retry scheduler.

mod common;

use common::{fast_config, statuses, wait_for_terminal};
use mosaic_jobs::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

/// Executor that fails the first `failures` attempts of every job.
fn flaky_executor(failures: u32, calls: Arc<AtomicU32>) -> Arc<dyn JobExecutor<String>> {
    Arc::new(executor_fn(move |_payload: String, ctx: JobContext| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if ctx.attempt <= failures {
                Err(JobError::ExecutionFailed(format!("attempt {} failed", ctx.attempt)))
            } else {
                Ok(())
            }
        }
    }))
}

#[tokio::test]
async fn test_submit_rejects_when_queue_full() {
    let calls = Arc::new(AtomicU32::new(0));
    let pool = WorkerPool::new(fast_config(1, 2), flaky_executor(0, calls)).unwrap();

    assert_ok!(pool.submit(Job::new("a".to_string())));
    assert_ok!(pool.submit(Job::new("b".to_string())));
    let third = pool.submit(Job::new("c".to_string()));

    assert!(matches!(third, Err(JobError::QueueFull { capacity: 2 })));
    assert_eq!(pool.stats().queued_count, 2);
}

#[tokio::test]
async fn test_retry_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let pool = WorkerPool::new(fast_config(2, 8), flaky_executor(2, calls.clone())).unwrap();
    let mut events = pool.subscribe();
    pool.start().unwrap();

    let job_id = pool.submit(Job::new("mosaic.png".to_string())).unwrap();
    let seen = wait_for_terminal(&mut events, &job_id).await;

    assert_eq!(
        statuses(&seen),
        vec![
            JobStatus::RetryScheduled,
            JobStatus::RetryScheduled,
            JobStatus::Succeeded
        ]
    );
    assert_eq!(seen.last().unwrap().attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let stats = pool.stats();
    assert_eq!(stats.jobs_succeeded, 1);
    assert_eq!(stats.jobs_failed, 0);
    pool.stop().await;
}

#[tokio::test]
async fn test_attempts_bounded_by_max_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let pool = WorkerPool::new(fast_config(1, 4), flaky_executor(u32::MAX, calls.clone())).unwrap();
    let mut events = pool.subscribe();
    pool.start().unwrap();

    let job_id = pool
        .submit(Job::new("always-fails".to_string()).max_retries(2))
        .unwrap();
    let seen = wait_for_terminal(&mut events, &job_id).await;

    let last = seen.last().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert_eq!(last.attempts, 3);
    assert!(last.error.as_deref().unwrap().contains("attempt 3 failed"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // No further attempt after the permanent failure.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(pool.stats().jobs_failed, 1);
    assert_eq!(pool.stats().retry_pending_count, 0);
    pool.stop().await;
}

#[tokio::test]
async fn test_retry_waits_for_delay() {
    let timestamps: Arc<Mutex<Vec<Instant>>> = Arc::default();
    let recorder = Arc::clone(&timestamps);
    let executor: Arc<dyn JobExecutor<String>> =
        Arc::new(executor_fn(move |_payload: String, ctx: JobContext| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().push(Instant::now());
                if ctx.attempt == 1 {
                    Err(JobError::Internal("transient".to_string()))
                } else {
                    Ok(())
                }
            }
        }));

    let mut config = fast_config(1, 4);
    config.retry_policy = RetryPolicy::fixed(Duration::from_millis(200));
    config.retry_tick = Duration::from_millis(20);
    let pool = WorkerPool::new(config, executor).unwrap();
    let mut events = pool.subscribe();
    pool.start().unwrap();

    let job_id = pool.submit(Job::new("delayed".to_string())).unwrap();
    let seen = wait_for_terminal(&mut events, &job_id).await;
    assert_eq!(seen.last().unwrap().status, JobStatus::Succeeded);

    let times = timestamps.lock().clone();
    assert_eq!(times.len(), 2);
    let gap = times[1] - times[0];
    assert!(gap >= Duration::from_millis(190), "retried too early: {gap:?}");
    assert!(gap < Duration::from_secs(2), "retried too late: {gap:?}");
    pool.stop().await;
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor: Arc<dyn JobExecutor<String>> =
        Arc::new(executor_fn(move |payload: String, _ctx: JobContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(JobError::NotFound(payload))
            }
        }));
    let pool = WorkerPool::new(fast_config(1, 4), executor).unwrap();
    let mut events = pool.subscribe();
    pool.start().unwrap();

    let job_id = pool.submit(Job::new("missing.png".to_string())).unwrap();
    let seen = wait_for_terminal(&mut events, &job_id).await;

    assert_eq!(statuses(&seen), vec![JobStatus::Failed]);
    assert_eq!(seen[0].attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    pool.stop().await;
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_job() {
    let started = Arc::new(Notify::new());
    let finished = Arc::new(AtomicUsize::new(0));
    let (started_tx, finished_rx) = (Arc::clone(&started), Arc::clone(&finished));
    let executor: Arc<dyn JobExecutor<String>> =
        Arc::new(executor_fn(move |_payload: String, _ctx: JobContext| {
            let started = Arc::clone(&started_tx);
            let finished = Arc::clone(&finished_rx);
            async move {
                started.notify_one();
                tokio::time::sleep(Duration::from_millis(200)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
    let pool = WorkerPool::new(fast_config(1, 4), executor).unwrap();
    pool.start().unwrap();

    pool.submit(Job::new("slow".to_string())).unwrap();
    started.notified().await;
    pool.stop().await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(!pool.is_running());
    assert_err!(pool.start());
}

#[tokio::test]
async fn test_cancel_pending_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut config = fast_config(1, 4);
    config.retry_policy = RetryPolicy::fixed(Duration::from_secs(60));
    let pool = WorkerPool::new(config, flaky_executor(u32::MAX, calls.clone())).unwrap();
    let mut events = pool.subscribe();
    pool.start().unwrap();

    let job_id = pool.submit(Job::with_id("cancel-me", "x".to_string())).unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.status, JobStatus::RetryScheduled);

    assert!(pool.cancel_retry(&job_id).await);
    assert!(!pool.cancel_retry(&job_id).await);
    assert_eq!(pool.stats().retry_pending_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    pool.stop().await;
}

#[tokio::test]
async fn test_concurrency_limit() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_ref, peak_ref) = (Arc::clone(&active), Arc::clone(&peak));
    let executor: Arc<dyn JobExecutor<String>> =
        Arc::new(executor_fn(move |_payload: String, _ctx: JobContext| {
            let active = Arc::clone(&active_ref);
            let peak = Arc::clone(&peak_ref);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }));
    let pool = WorkerPool::new(fast_config(2, 16), executor).unwrap();
    let mut events = pool.subscribe();

    for i in 0..8 {
        pool.submit(Job::new(format!("job-{i}"))).unwrap();
    }
    pool.start().unwrap();

    let mut done = 0;
    while done < 8 {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("jobs did not finish in time")
            .unwrap();
        if event.status.is_terminal() {
            done += 1;
        }
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(pool.stats().jobs_succeeded, 8);
    pool.stop().await;
}
