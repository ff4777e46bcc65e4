// src/crawl/backoff.rs

//! Rate-limit backoff computation and failure tracking.
//!
//! The policy is pure: exponential growth from a base delay, capped, with
//! symmetric jitter. The state tracks consecutive rate-limit failures and
//! when the last one happened; only a successful page fetch resets it.

use std::time::{Duration, Instant};

/// Window after a rate limit during which the per-item delay is tripled.
const RECENT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(300);

/// Window after a rate limit during which the per-item delay is doubled.
const MODERATE_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(600);

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    /// Symmetric jitter fraction; 0.1 spreads delays over [0.9, 1.1]×.
    jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(600),
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self { base, max, jitter }
    }

    /// Cooldown for the n-th consecutive failure (n ≥ 1):
    /// `min(base * 2^(n-1), max)`, jittered.
    pub fn delay(&self, failures: u32) -> Duration {
        let n = failures.max(1);
        let raw = self.base.as_secs_f64() * 2f64.powi(n as i32 - 1);
        let capped = raw.min(self.max.as_secs_f64());

        let factor = 1.0 + self.jitter * (fastrand::f64() - 0.5) * 2.0;
        Duration::from_secs_f64(capped * factor)
    }
}

/// Consecutive rate-limit failure tracking.
///
/// Owned exclusively by the orchestrator; reset to zero only by a successful
/// page fetch, never by entering backoff or by item-level successes.
#[derive(Debug, Default)]
pub struct BackoffState {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl BackoffState {
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a rate-limit failure. Returns the post-increment count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.last_failure = Some(Instant::now());
        self.consecutive_failures
    }

    /// A successful page fetch clears the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Per-item throttle: stretch the base delay while rate-limit signals are
    /// recent, so the crawl slows down proactively instead of bouncing off
    /// the server again.
    pub fn dynamic_delay(&self, base: Duration) -> Duration {
        if self.consecutive_failures == 0 {
            return base;
        }
        match self.last_failure.map(|at| at.elapsed()) {
            Some(elapsed) if elapsed < RECENT_RATE_LIMIT_WINDOW => base * 3,
            Some(elapsed) if elapsed < MODERATE_RATE_LIMIT_WINDOW => base * 2,
            _ => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_without_jitter() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(600), 0.0)
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = policy_without_jitter();
        let expected = [60, 120, 240, 480, 600];
        for (n, secs) in (1..=5).zip(expected) {
            assert_eq!(policy.delay(n), Duration::from_secs(secs), "n = {n}");
        }
        // Past the cap the delay stays flat.
        assert_eq!(policy.delay(12), Duration::from_secs(600));
    }

    #[test]
    fn test_zero_failures_treated_as_first() {
        let policy = policy_without_jitter();
        assert_eq!(policy.delay(0), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = BackoffPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay(1).as_secs_f64();
            assert!((54.0..=66.0).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_failure_streak_counts_and_resets() {
        let mut state = BackoffState::default();
        assert_eq!(state.record_failure(), 1);
        assert_eq!(state.record_failure(), 2);

        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.record_failure(), 1);
    }

    #[test]
    fn test_dynamic_delay_triples_right_after_rate_limit() {
        let base = Duration::from_secs(1);
        let mut state = BackoffState::default();
        assert_eq!(state.dynamic_delay(base), base);

        state.record_failure();
        assert_eq!(state.dynamic_delay(base), base * 3);
    }

    #[test]
    fn test_dynamic_delay_windows() {
        let base = Duration::from_secs(1);
        let mut state = BackoffState {
            consecutive_failures: 1,
            last_failure: Some(Instant::now() - Duration::from_secs(400)),
        };
        assert_eq!(state.dynamic_delay(base), base * 2);

        state.last_failure = Some(Instant::now() - Duration::from_secs(700));
        assert_eq!(state.dynamic_delay(base), base);

        // Without an active streak the windows are irrelevant.
        state.consecutive_failures = 0;
        state.last_failure = Some(Instant::now());
        assert_eq!(state.dynamic_delay(base), base);
    }
}
