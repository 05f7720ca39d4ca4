//! Mosaic Jobs - In-Process Job Queue System
//!
//! A bounded, in-memory job queue with:
//! - Non-blocking submission that fails fast when the queue is full
//! - A fixed-size worker pool sharing one queue
//! - Retry policies (fixed, linear, exponential) with an attempt ceiling
//! - A single-owner retry scheduler that re-enqueues due jobs
//! - Job outcome events and pool statistics
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Mosaic Jobs Architecture                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  Producer ── submit() ──┐          (QueueFull when at cap)    │
//! │                         ▼                                     │
//! │  ┌────────────────────────────────────────────────────┐       │
//! │  │            Bounded Work Queue (capacity N)          │◄──┐  │
//! │  └───────────────────────┬────────────────────────────┘   │  │
//! │                          ▼                                 │  │
//! │  ┌────────────────────────────────────────────────────┐   │  │
//! │  │                    Worker Pool                      │   │  │
//! │  │  ┌──────────┐ ┌──────────┐ ┌──────────┐            │   │  │
//! │  │  │ Worker 1 │ │ Worker 2 │ │ Worker N │            │   │  │
//! │  │  └────┬─────┘ └────┬─────┘ └────┬─────┘            │   │  │
//! │  └───────┼────────────┼────────────┼──────────────────┘   │  │
//! │          └──────┬─────┴──────┬─────┘                      │  │
//! │                 ▼            ▼                            │  │
//! │          ┌───────────┐ ┌─────────────────┐   due jobs     │  │
//! │          │ Succeeded │ │ Retry Scheduler │────────────────┘  │
//! │          │ / Failed  │ │  (tick driven)  │                   │
//! │          └───────────┘ └─────────────────┘                   │
//! │                                                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use mosaic_jobs::prelude::*;
//! use std::sync::Arc;
//!
//! let executor = executor_fn(|path: String, ctx: JobContext| async move {
//!     tracing::info!(attempt = ctx.attempt, %path, "rendering");
//!     Ok(())
//! });
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::default(), Arc::new(executor))?;
//! pool.start()?;
//! pool.submit(Job::new("input.png".to_string()))?;
//! // ...
//! pool.stop().await;
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod worker;

pub use config::{JobsConfig, QueueConfig, RetryConfig, WorkerConfig};
pub use error::{JobError, JobResult};
pub use job::{Job, JobContext, JobEvent, JobId, JobStatus, DEFAULT_MAX_RETRIES};
pub use metrics::{register_metrics, JobMetrics, WorkerMetrics};
pub use queue::{JobQueue, JobReceiver};
pub use retry::{RetryPolicy, RetryStrategy};
pub use scheduler::{ReleaseSummary, RetryCommand, RetryScheduler};
pub use worker::{executor_fn, FnExecutor, JobExecutor, PoolStats, WorkerPool, WorkerPoolConfig};

/// Re-export commonly used traits
pub mod prelude {
    pub use crate::job::{Job, JobEvent, JobStatus};
    pub use crate::retry::RetryPolicy;
    pub use crate::worker::{executor_fn, JobExecutor, WorkerPool, WorkerPoolConfig};
    pub use crate::{JobContext, JobError, JobId, JobResult};
}
