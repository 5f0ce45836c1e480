//! Reconnect delay calculation.
//!
//! The policy is pure: it never sleeps and holds no mutable state. The manager
//! owns a [`ReconnectPolicyState`] and asks the policy for the next one.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Consecutive-failure bookkeeping for the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicyState {
    /// Failures since the last successful open.
    pub consecutive_failures: u32,
    /// Delay to use for the next scheduled reconnect.
    pub current_delay: Duration,
}

/// Geometric backoff between a floor and a ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    floor: Duration,
    ceiling: Duration,
    multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffPolicy {
    /// Create a policy. The ceiling is raised to the floor if it is lower.
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration, multiplier: f64) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            multiplier,
        }
    }

    /// Create a policy from configuration.
    #[must_use]
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.floor_ms),
            Duration::from_millis(config.ceiling_ms),
            config.multiplier,
        )
    }

    /// Shortest delay.
    #[must_use]
    pub const fn floor(&self) -> Duration {
        self.floor
    }

    /// Longest delay; also the recovery probe interval.
    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// State after a successful open or a fresh session.
    #[must_use]
    pub const fn reset(&self) -> ReconnectPolicyState {
        ReconnectPolicyState {
            consecutive_failures: 0,
            current_delay: self.floor,
        }
    }

    /// Delay following `state.current_delay`, capped at the ceiling.
    #[must_use]
    pub fn next(&self, state: &ReconnectPolicyState) -> Duration {
        let grown = Duration::try_from_secs_f64(state.current_delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.ceiling);
        grown.clamp(self.floor, self.ceiling)
    }

    /// Count one failure.
    ///
    /// Returns the new state and the delay to schedule now. The n-th consecutive
    /// failure schedules `min(floor × multiplier^(n-1), ceiling)`.
    #[must_use]
    pub fn record_failure(&self, state: ReconnectPolicyState) -> (ReconnectPolicyState, Duration) {
        let delay = state.current_delay.clamp(self.floor, self.ceiling);
        let next = ReconnectPolicyState {
            consecutive_failures: state.consecutive_failures.saturating_add(1),
            current_delay: self.next(&state),
        };
        (next, delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reset_starts_at_floor() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.reset(),
            ReconnectPolicyState {
                consecutive_failures: 0,
                current_delay: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn five_failures_follow_the_documented_sequence() {
        let policy = BackoffPolicy::default();
        let mut state = policy.reset();
        let mut delays = Vec::new();
        for _ in 0..5 {
            let (next, delay) = policy.record_failure(state);
            delays.push(delay);
            state = next;
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5_000),
                Duration::from_millis(7_500),
                Duration::from_millis(11_250),
                Duration::from_micros(16_875_000),
                Duration::from_micros(25_312_500),
            ]
        );
        assert_eq!(state.consecutive_failures, 5);
    }

    #[test]
    fn delay_stops_at_ceiling() {
        let policy = BackoffPolicy::default();
        let mut state = policy.reset();
        for _ in 0..20 {
            state = policy.record_failure(state).0;
        }
        assert_eq!(state.current_delay, Duration::from_secs(60));
        assert_eq!(policy.record_failure(state).1, Duration::from_secs(60));
    }

    #[test]
    fn ceiling_below_floor_is_raised() {
        let policy = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(1), 2.0);
        assert_eq!(policy.ceiling(), Duration::from_secs(10));
        assert_eq!(policy.next(&policy.reset()), Duration::from_secs(10));
    }

    proptest! {
        #[test]
        fn delays_grow_until_ceiling(failures in 1u32..40) {
            let policy = BackoffPolicy::default();
            let mut state = policy.reset();
            let mut previous = Duration::ZERO;
            for n in 1..=failures {
                let (next, delay) = policy.record_failure(state);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= policy.ceiling());

                let exact = 5.0 * 1.5_f64.powi(i32::try_from(n - 1).unwrap_or(i32::MAX));
                let expected = exact.min(60.0);
                prop_assert!((delay.as_secs_f64() - expected).abs() < 1e-6);

                previous = delay;
                state = next;
            }
        }
    }
}
