//! # Reconnect Backoff
//!
//! Purpose: Pace reconnect attempts against a node that keeps failing.
//!
//! ## Design Principles
//! 1. **Doubling With A Cap**: Each failure doubles the wait, never past `max`.
//! 2. **One Success Resets**: A good dial drops the wait back to `base`.

use std::time::Duration;

/// Reconnect wait that doubles on each failure up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Backoff {
            base,
            max,
            current: base,
            failures: 0,
        }
    }

    /// Wait before the next reconnect attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed attempt and doubles the wait, saturating at the cap.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_base() {
        let base = Duration::from_millis(100);
        let mut backoff = Backoff::new(base, Duration::from_secs(60));
        for k in 1..=5u32 {
            assert_eq!(backoff.current(), base * 2u32.pow(k - 1));
            backoff.record_failure();
        }
        assert_eq!(backoff.failures(), 5);
    }

    #[test]
    fn caps_at_max() {
        let mut backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(300));
        for _ in 0..10 {
            backoff.record_failure();
        }
        assert_eq!(backoff.current(), Duration::from_secs(300));
    }

    #[test]
    fn success_resets() {
        let base = Duration::from_secs(5);
        let mut backoff = Backoff::new(base, Duration::from_secs(300));
        backoff.record_failure();
        backoff.record_failure();
        backoff.reset();
        assert_eq!(backoff.current(), base);
        assert_eq!(backoff.failures(), 0);
        backoff.record_failure();
        assert_eq!(backoff.current(), base * 2);
    }
}
