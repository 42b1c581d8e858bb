//! Capped exponential backoff for reconnection attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Policy translating an attempt number into a reconnection delay.
///
/// Delays grow as `base_backoff_ms * 2^attempt`, never exceed `max_backoff_ms`,
/// and never fall below half the computed value when jitter is on. After
/// `max_attempts` consecutive failures the budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Base delay for exponential backoff (milliseconds).
    pub base_backoff_ms: u64,
    /// Maximum backoff delay (milliseconds).
    pub max_backoff_ms: u64,
    /// Whether to add deterministic jitter to backoff delays.
    pub jitter_enabled: bool,
    /// Consecutive failed attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            jitter_enabled: true,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set base backoff delay.
    #[must_use]
    pub const fn with_base_backoff_ms(mut self, ms: u64) -> Self {
        self.base_backoff_ms = ms;
        self
    }

    /// Builder: set max backoff delay.
    #[must_use]
    pub const fn with_max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Builder: enable/disable jitter.
    #[must_use]
    pub const fn with_jitter_enabled(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Builder: set the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Compute backoff delay for a given attempt number (0-indexed).
    #[must_use]
    pub fn compute_backoff_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.min(30);
        let delay = self.base_backoff_ms.saturating_mul(1u64 << exp);
        delay.min(self.max_backoff_ms)
    }

    /// Compute backoff delay with jitter in `[0.5, 1.0]` of the base value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute_backoff_with_jitter_ms(&self, attempt: u32, jitter_factor: f64) -> u64 {
        let base = self.compute_backoff_ms(attempt);
        if !self.jitter_enabled {
            return base;
        }

        let factor = jitter_factor.clamp(0.0, 1.0).mul_add(0.5, 0.5);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = (base as f64 * factor) as u64;
        jittered
    }

    /// Delay to wait before the attempt following `attempt` failures.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = (f64::from(attempt) * 0.1).fract();
        Duration::from_millis(self.compute_backoff_with_jitter_ms(attempt, jitter))
    }

    /// Whether `attempts` consecutive failures exhaust the budget.
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Validate the policy, returning every problem found.
    ///
    /// # Errors
    ///
    /// Returns error strings for any invalid value.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.base_backoff_ms == 0 {
            errors.push("base_backoff_ms must be > 0".to_string());
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            errors.push("max_backoff_ms must be >= base_backoff_ms".to_string());
        }
        if self.max_attempts == 0 {
            errors.push("max_attempts must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = BackoffPolicy::new()
            .with_base_backoff_ms(100)
            .with_max_backoff_ms(1_000)
            .with_jitter_enabled(false);

        assert_eq!(policy.compute_backoff_ms(0), 100);
        assert_eq!(policy.compute_backoff_ms(1), 200);
        assert_eq!(policy.compute_backoff_ms(3), 800);
        assert_eq!(policy.compute_backoff_ms(4), 1_000);
        assert_eq!(policy.compute_backoff_ms(40), 1_000);
    }

    #[test]
    fn jitter_stays_within_half_and_full() {
        let policy = BackoffPolicy::new().with_base_backoff_ms(1_000);
        let low = policy.compute_backoff_with_jitter_ms(0, 0.0);
        let high = policy.compute_backoff_with_jitter_ms(0, 1.0);
        assert_eq!(low, 500);
        assert_eq!(high, 1_000);
        assert!((500..=1_000).contains(&policy.compute_backoff_with_jitter_ms(0, 7.5)));
    }

    #[test]
    fn delay_for_attempt_without_jitter_is_exact() {
        let policy = BackoffPolicy::new()
            .with_base_backoff_ms(250)
            .with_jitter_enabled(false);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1_000));
    }

    #[test]
    fn exhaustion_at_max_attempts() {
        let policy = BackoffPolicy::new().with_max_attempts(3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn default_values() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_backoff_ms, 1_000);
        assert_eq!(policy.max_backoff_ms, 30_000);
        assert_eq!(policy.max_attempts, 5);
        assert!(policy.jitter_enabled);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn validate_collects_all_errors() {
        let policy = BackoffPolicy {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_enabled: false,
            max_attempts: 0,
        };
        let errors = policy.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("base_backoff_ms")));
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
    }
}
