//! Polling retry policy.
//!
//! The default keeps the plain behaviour: poll again after the same interval
//! no matter how often the API failed. A backoff ceiling turns on doubling.

use barqing_core::config::RefresherConfig;
use std::time::Duration;

/// How long a refresher waits before its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub backoff_ceiling: Option<Duration>,
}

impl RetryPolicy {
    /// Same interval forever.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            backoff_ceiling: None,
        }
    }

    /// Double the wait per consecutive failure, never beyond `ceiling`.
    pub fn with_backoff(interval: Duration, ceiling: Duration) -> Self {
        Self {
            interval,
            backoff_ceiling: Some(ceiling),
        }
    }

    pub fn from_config(config: &RefresherConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            backoff_ceiling: config.backoff_ceiling(),
        }
    }

    /// Wait before the next tick given the current failure streak.
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        match self.backoff_ceiling {
            None => self.interval,
            Some(ceiling) => {
                let factor = 2u32.saturating_pow(consecutive_failures.min(31));
                self.interval
                    .saturating_mul(factor)
                    .min(ceiling.max(self.interval))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}
