//! Reconnection policy for the coordinator link.
//!
//! Connection attempts are bounded: after `max_attempts` consecutive
//! failures the link gives up instead of retrying forever. The delay between
//! attempts grows linearly by `step` and is capped at `max_delay`.

use log::warn;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Added to the delay after every further failure.
    pub step: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            step: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Tracks consecutive failures against a [`RetryPolicy`].
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Consecutive failures since the last successful connection.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Forget past failures after a successful connection.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay before the next attempt, or `None` once the attempt
    /// budget is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        if self.failures >= self.policy.max_attempts {
            warn!(
                "[Conn] Retry budget spent after {} consecutive failures",
                self.failures
            );
            return None;
        }

        let delay = self.policy.initial_delay + self.policy.step * (self.failures - 1);
        Some(delay.min(self.policy.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_delays() {
        let mut backoff = Backoff::new(RetryPolicy::default());

        assert_eq!(backoff.record_failure(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.record_failure(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.record_failure(), Some(Duration::from_secs(3)));
        assert_eq!(backoff.record_failure(), Some(Duration::from_secs(4)));
        // Fifth failure exhausts the budget: no sixth attempt.
        assert_eq!(backoff.record_failure(), None);
        assert_eq!(backoff.failures(), 5);
    }

    #[test]
    fn test_delay_is_capped() {
        let mut backoff = Backoff::new(RetryPolicy {
            max_attempts: 10,
            ..Default::default()
        });

        let delays: Vec<_> = std::iter::from_fn(|| backoff.record_failure()).collect();
        assert_eq!(delays.len(), 9);
        assert_eq!(delays[3], Duration::from_secs(4));
        assert!(delays[4..].iter().all(|d| *d == Duration::from_secs(5)));
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut backoff = Backoff::new(RetryPolicy::default());
        for _ in 0..4 {
            backoff.record_failure();
        }
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.record_failure(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_single_attempt_policy() {
        let mut backoff = Backoff::new(RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        });
        assert_eq!(backoff.record_failure(), None);
    }
}
