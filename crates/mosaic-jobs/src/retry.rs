//! Retry delay policies.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay growth strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay grows by `delay` on each retry.
    Linear,
    /// Delay multiplies by `multiplier` on each retry.
    Exponential,
}

/// Computes how long a failed job waits before its next attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry strategy.
    pub strategy: RetryStrategy,

    /// Base delay.
    pub delay: Duration,

    /// Upper bound for any computed delay.
    pub max_delay: Duration,

    /// Growth factor (exponential only).
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// Creates a fixed delay policy.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Fixed,
            delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Creates a linear backoff policy.
    pub fn linear(increment: Duration, max_delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Linear,
            delay: increment,
            max_delay,
            multiplier: 1.0,
        }
    }

    /// Creates an exponential backoff policy.
    pub fn exponential(initial: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            delay: initial,
            max_delay,
            multiplier,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            RetryStrategy::Fixed => self.delay,
            RetryStrategy::Linear => self.delay.saturating_mul(attempt),
            RetryStrategy::Exponential => {
                let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let secs = self.delay.as_secs_f64() * self.multiplier.powi(exp);
                if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs.max(0.0))
                } else {
                    self.max_delay
                }
            }
        };

        delay.min(self.max_delay)
    }
}
