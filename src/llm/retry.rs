use std::time::Duration;

use rand::Rng;

use crate::config::Config;

/// Retry schedule for upstream calls: randomized exponential backoff with
/// the delay drawn uniformly between the initial delay and a doubling cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms.max(1)),
            max_delay: Duration::from_millis(
                config.max_backoff_ms.max(config.initial_backoff_ms.max(1)),
            ),
        }
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based, the attempt
    /// that just failed). The cap doubles per attempt, bounded by
    /// `max_delay`; the actual delay is sampled uniformly so concurrent
    /// clients do not retry in lockstep.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exp = attempt.saturating_sub(1).min(31);
        let cap_ms = base_ms.saturating_mul(1u64 << exp).min(max_ms);
        let floor_ms = base_ms.min(cap_ms);
        let sampled = rand::rng().random_range(floor_ms..=cap_ms);
        Duration::from_millis(sampled)
    }
}

pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_configured_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=10 {
            let delay = policy.delay_after(attempt);
            assert!(delay >= policy.initial_delay, "attempt {}", attempt);
            assert!(delay <= policy.max_delay, "attempt {}", attempt);
        }
    }

    #[test]
    fn cap_doubles_until_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        // Attempt 1 cap is the initial delay itself.
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        // Later attempts are bounded by max_delay even as the cap doubles.
        for attempt in 2..=8 {
            assert!(policy.delay_after(attempt) <= policy.max_delay);
        }
    }

    #[test]
    fn degenerate_policy_is_constant() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(5),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(5));
        assert_eq!(policy.delay_after(7), Duration::from_millis(5));
    }

    #[test]
    fn exhaustion_counts_attempts_inclusively() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn retryable_statuses_cover_rate_limits_and_server_errors() {
        use reqwest::StatusCode;
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }
}
