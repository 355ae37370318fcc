//! Retry policy for audit attempts.
//!
//! Delays escalate with the retry number and with the error class: closed
//! sessions wait roughly 3x the base, network failures roughly 4x.

use std::time::Duration;

use super::error::ErrorClass;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Delay unit for transient errors.
    pub base_delay: Duration,
    /// Multiplier for closed target/session errors.
    pub closed_multiplier: u32,
    /// Multiplier for network errors.
    pub network_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(5),
            closed_multiplier: 3,
            network_multiplier: 4,
        }
    }
}

impl RetryPolicy {
    /// Create policy with custom values.
    pub fn new(max_retries: u32, base_delay: Duration, closed_multiplier: u32, network_multiplier: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            closed_multiplier,
            network_multiplier,
        }
    }

    /// Whether a failure of `class` on retry number `retry` (0 = first attempt) gets another try.
    pub fn should_retry(&self, class: ErrorClass, retry: u32) -> bool {
        class.is_retryable() && retry < self.max_retries
    }

    /// Delay before the retry that follows attempt number `retry`.
    ///
    /// `base * (retry + 1) * class multiplier`.
    pub fn delay_for(&self, class: ErrorClass, retry: u32) -> Duration {
        let multiplier = match class {
            ErrorClass::SessionClosed => self.closed_multiplier,
            ErrorClass::Network => self.network_multiplier,
            ErrorClass::Transient | ErrorClass::Terminal => 1,
        };
        self.base_delay.saturating_mul((retry + 1).saturating_mul(multiplier))
    }

    /// Sum of every delay the policy could impose, for bounding a whole `run_audit` call.
    pub fn worst_case_backoff(&self) -> Duration {
        let largest = self.closed_multiplier.max(self.network_multiplier).max(1);
        (0..self.max_retries)
            .map(|retry| self.base_delay.saturating_mul((retry + 1).saturating_mul(largest)))
            .sum()
    }
}
