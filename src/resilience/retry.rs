//! Retry policy value objects.
//!
//! Every bounded retry loop in the orchestrator (command execution,
//! readiness polling, provider calls) is driven by an injected
//! [`RetryPolicy`] rather than a hand-rolled loop at the call site.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inter-attempt delay strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay between every attempt
    Fixed { delay: Duration },
    /// Delay grows by `multiplier` per attempt, capped at `max`
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
}

/// Bounded retry policy: attempt budget plus backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Fixed { delay },
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Exponential {
                base,
                multiplier,
                max,
            },
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Whether another attempt is allowed after `attempt` attempts have
    /// already failed (1-based).
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed { delay } => delay,
            BackoffStrategy::Exponential {
                base,
                multiplier,
                max,
            } => {
                let exponent = attempt.saturating_sub(1);
                let scaled = base.as_secs_f64() * multiplier.powi(exponent as i32);
                Duration::from_secs_f64(scaled).min(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
    }

    #[test]
    fn test_no_retry_allows_single_attempt() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.allows_retry(1));
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(7));
        assert_eq!(policy.delay_after(1), Duration::from_secs(7));
        assert_eq!(policy.delay_after(4), Duration::from_secs(7));
    }

    #[test]
    fn test_exponential_delay_grows_and_caps() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_secs(1),
            2.0,
            Duration::from_secs(30),
        );
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        // 2^9 = 512s, capped
        assert_eq!(policy.delay_after(10), Duration::from_secs(30));
    }
}
