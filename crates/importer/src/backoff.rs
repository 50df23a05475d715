//! Retry delays for failed progress requests and push connects.
//!
//! A [`Backoff`] counts consecutive failures. The first failure waits
//! [`BackoffConfig::initial_delay`], each further one multiplies the
//! previous wait, capped at [`BackoffConfig::max_delay`]. A success
//! resets it.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Consecutive-failure state of one retrying loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    failures: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: 0,
            current: Duration::ZERO,
        }
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn fail(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current = if self.failures == 1 {
            self.config.initial_delay.min(self.config.max_delay)
        } else {
            let scaled = self.current.as_secs_f64() * self.config.multiplier;
            Duration::try_from_secs_f64(scaled)
                .unwrap_or(self.config.max_delay)
                .min(self.config.max_delay)
        };
        self.current
    }

    /// Forget earlier failures.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.current = Duration::ZERO;
    }

    /// Failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
