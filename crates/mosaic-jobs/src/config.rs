//! Job system configuration.

use crate::error::{JobError, JobResult};
use crate::retry::{RetryPolicy, RetryStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the job system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl JobsConfig {
    /// Rejects values the pool cannot run with.
    pub fn validate(&self) -> JobResult<()> {
        if self.worker.concurrency == 0 {
            return Err(JobError::Configuration(
                "worker.concurrency must be greater than zero".to_string(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(JobError::Configuration(
                "queue.capacity must be greater than zero".to_string(),
            ));
        }
        if self.retry.tick_secs == 0 {
            return Err(JobError::Configuration(
                "retry.tick_secs must be greater than zero".to_string(),
            ));
        }
        if self.retry.strategy == RetryStrategy::Exponential && self.retry.multiplier < 1.0 {
            return Err(JobError::Configuration(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-attempt timeout in seconds (0 disables it).
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            job_timeout_secs: default_job_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    // One worker per two cores, at least one.
    std::thread::available_parallelism()
        .map(|p| p.get() / 2)
        .unwrap_or(1)
        .max(1)
}

fn default_job_timeout() -> u64 {
    900 // 15 minutes, above the renderer deadline
}

impl WorkerConfig {
    /// Returns the per-attempt timeout, if enabled.
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of buffered jobs.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Retry ceiling given to newly submitted jobs.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_capacity() -> usize {
    100
}

fn default_max_retries() -> u32 {
    crate::job::DEFAULT_MAX_RETRIES
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay growth strategy.
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Base delay in seconds.
    #[serde(default = "default_delay")]
    pub delay_secs: u64,

    /// Maximum delay in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Backoff multiplier (exponential only).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Scheduler tick interval in seconds.
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            delay_secs: default_delay(),
            max_delay_secs: default_max_delay(),
            multiplier: default_multiplier(),
            tick_secs: default_tick(),
        }
    }
}

fn default_delay() -> u64 {
    60
}

fn default_max_delay() -> u64 {
    3600
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_tick() -> u64 {
    30
}

impl RetryConfig {
    /// Builds the retry policy described by this configuration.
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.delay_secs);
        let max_delay = Duration::from_secs(self.max_delay_secs.max(self.delay_secs));
        match self.strategy {
            RetryStrategy::Fixed => RetryPolicy::fixed(delay),
            RetryStrategy::Linear => RetryPolicy::linear(delay, max_delay),
            RetryStrategy::Exponential => {
                RetryPolicy::exponential(delay, self.multiplier, max_delay)
            }
        }
    }

    /// Returns the scheduler tick as Duration.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = JobsConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker.concurrency >= 1);
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.retry.tick(), Duration::from_secs(30));
        assert_eq!(config.worker.job_timeout(), Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = JobsConfig::default();
        config.worker.concurrency = 0;
        assert!(matches!(config.validate(), Err(JobError::Configuration(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = JobsConfig::default();
        config.queue.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_timeout_disabled() {
        let config = WorkerConfig {
            concurrency: 1,
            job_timeout_secs: 0,
        };
        assert_eq!(config.job_timeout(), None);
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            strategy: RetryStrategy::Exponential,
            delay_secs: 10,
            max_delay_secs: 100,
            multiplier: 3.0,
            tick_secs: 5,
        };
        let policy = config.policy();
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(100));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: JobsConfig =
            serde_json::from_str(r#"{"queue":{"capacity":5},"retry":{"strategy":"linear"}}"#)
                .unwrap();
        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.retry.strategy, RetryStrategy::Linear);
        assert_eq!(config.retry.delay_secs, 60);
    }
}
