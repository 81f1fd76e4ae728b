//! Exponential backoff and circuit-breaker arithmetic.
//!
//! Pure state transitions; the engine owns the timers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(3600);
pub const DEFAULT_CIRCUIT_THRESHOLD: u32 = 10;

/// `delay(k) = min(initial × 2^(k-1), max)` for the k-th consecutive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_BACKOFF,
            max: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay after `consecutive_errors` failures in a row. Zero failures
    /// means no delay.
    pub fn delay(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(consecutive_errors - 1).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Consecutive cycle failures and the backoff currently in force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    pub consecutive_errors: u32,
    pub current_backoff: Duration,
}

impl CircuitState {
    /// Register a cycle-level failure and return how long to wait.
    pub fn record_failure(&mut self, policy: &BackoffPolicy) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.current_backoff = policy.delay(self.consecutive_errors);
        self.current_backoff
    }

    /// A cycle completed without a cycle-level failure.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.current_backoff = Duration::ZERO;
    }

    pub fn is_tripped(&self, threshold: u32) -> bool {
        self.consecutive_errors >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_then_caps() {
        let policy = BackoffPolicy::default();
        let secs: Vec<u64> = (1..=8).map(|k| policy.delay(k).as_secs()).collect();
        assert_eq!(secs, vec![60, 120, 240, 480, 960, 1920, 3600, 3600]);
    }

    #[test]
    fn huge_failure_counts_do_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(40), Duration::from_secs(3600));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn zero_failures_means_no_wait() {
        assert_eq!(BackoffPolicy::default().delay(0), Duration::ZERO);
    }

    #[test]
    fn circuit_counts_and_resets() {
        let policy = BackoffPolicy::default();
        let mut circuit = CircuitState::default();
        for k in 1..=3u32 {
            let wait = circuit.record_failure(&policy);
            assert_eq!(wait, policy.delay(k));
        }
        assert_eq!(circuit.consecutive_errors, 3);
        assert!(!circuit.is_tripped(DEFAULT_CIRCUIT_THRESHOLD));

        circuit.record_success();
        assert_eq!(circuit, CircuitState::default());
    }

    #[test]
    fn trips_exactly_at_threshold() {
        let policy = BackoffPolicy::default();
        let mut circuit = CircuitState::default();
        for _ in 0..9 {
            circuit.record_failure(&policy);
            assert!(!circuit.is_tripped(10));
        }
        circuit.record_failure(&policy);
        assert!(circuit.is_tripped(10));
    }
}
