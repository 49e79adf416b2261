//! Retry policy for the position cycle engine.
//!
//! Two layers: a fixed-backoff attempt budget for each open/close
//! sub-protocol, and an outer iteration retry with exponential backoff that
//! is bounded by `max_iteration_retries` consecutive failures (0 = unbounded).

use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ITERATION_RETRIES: u32 = 20;
pub const DEFAULT_ITERATION_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_ITERATION_BACKOFF_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Open/close attempts before escalating
    pub attempts: u32,
    /// Fixed wait between sub-protocol attempts
    pub backoff: Duration,
    /// Consecutive failed iterations tolerated; 0 never gives up
    pub max_iteration_retries: u32,
    pub iteration_backoff_base: Duration,
    pub iteration_backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            max_iteration_retries: DEFAULT_MAX_ITERATION_RETRIES,
            iteration_backoff_base: DEFAULT_ITERATION_BACKOFF_BASE,
            iteration_backoff_max: DEFAULT_ITERATION_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// Same budgets, no waiting (tests and dry environments)
    pub fn without_delays(mut self) -> Self {
        self.backoff = Duration::ZERO;
        self.iteration_backoff_base = Duration::ZERO;
        self.iteration_backoff_max = Duration::ZERO;
        self
    }

    pub fn with_max_iteration_retries(mut self, max: u32) -> Self {
        self.max_iteration_retries = max;
        self
    }

    /// Wait before outer retry number `failures` (1-based):
    /// `min(base * 2^(failures-1), max)`
    pub fn iteration_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.iteration_backoff_base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.iteration_backoff_max)
            .min(self.iteration_backoff_max)
    }

    pub fn iteration_retries_exhausted(&self, failures: u32) -> bool {
        self.max_iteration_retries != 0 && failures > self.max_iteration_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_iteration_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.iteration_backoff(1), Duration::from_secs(1));
        assert_eq!(policy.iteration_backoff(2), Duration::from_secs(2));
        assert_eq!(policy.iteration_backoff(4), Duration::from_secs(8));
        assert_eq!(policy.iteration_backoff(7), Duration::from_secs(60));
        assert_eq!(policy.iteration_backoff(500), Duration::from_secs(60));
    }

    #[test]
    fn test_exhaustion_bound() {
        let policy = RetryPolicy::default().with_max_iteration_retries(2);

        assert!(!policy.iteration_retries_exhausted(1));
        assert!(!policy.iteration_retries_exhausted(2));
        assert!(policy.iteration_retries_exhausted(3));
    }

    #[test]
    fn test_zero_bound_never_exhausts() {
        let policy = RetryPolicy::default().with_max_iteration_retries(0);
        assert!(!policy.iteration_retries_exhausted(u32::MAX));
    }

    #[test]
    fn test_without_delays() {
        let policy = RetryPolicy::default().without_delays();

        assert_eq!(policy.backoff, Duration::ZERO);
        assert_eq!(policy.iteration_backoff(10), Duration::ZERO);
        assert_eq!(policy.attempts, 3);
    }
}
