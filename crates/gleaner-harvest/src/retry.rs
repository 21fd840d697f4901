//! Retry policy with exponential backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How often and how patiently a transient failure is retried
///
/// The wait before retry `n` (0-based) is `initial_backoff * multiplier^n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before the first retry, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Growth factor between retries
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait before retry number `attempt` (0-based)
    ///
    /// # Examples
    ///
    /// ```
    /// use gleaner_harvest::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay(0), Duration::from_secs(1));
    /// assert_eq!(policy.delay(2), Duration::from_secs(4));
    /// ```
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let millis = self.initial_backoff_ms as f64 * factor;
        Duration::from_secs_f64((millis / 1000.0).max(0.0))
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("retry multiplier must be at least 1.0".to_string());
        }
        Ok(())
    }
}
