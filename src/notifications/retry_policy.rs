//! Retry policy for notification delivery.
//!
//! Implements exponential backoff with configurable parameters.

use crate::config::NotificationSettings;
use crate::provider_error::ProviderError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total delivery tries per notification, the first one included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Cap for exponential growth.
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &NotificationSettings) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Delay before the try following `attempts_made` failed ones:
    /// `initial_backoff * multiplier^(attempts_made - 1)`, capped.
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1) as i32;
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    /// Whether another try is allowed after `attempts_made` tries ended in `error`.
    pub fn should_retry(&self, error: &ProviderError, attempts_made: u32) -> bool {
        error.is_transient() && attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&NotificationSettings::default())
    }
}
