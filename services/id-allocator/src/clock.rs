//! Millisecond clock abstraction
//!
//! The allocator reads time through this trait so allocation behavior under
//! stalled or regressing clocks is testable without touching the wall clock.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of unix-epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock. The default for production allocators.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Deterministic clock for tests and simulation runs.
///
/// Holds a fixed reading until explicitly moved; `advance` may be called
/// from another thread while an allocation is waiting out an exhausted
/// sequence window.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Move the clock forward (or backward, for regression scenarios).
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_current() {
        let clock = SystemClock;
        let before = Utc::now().timestamp_millis();
        let reading = clock.now_millis();
        let after = Utc::now().timestamp_millis();
        assert!(reading >= before && reading <= after);
    }

    #[test]
    fn test_manual_clock_holds_and_moves() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.advance(5);
        assert_eq!(clock.now_millis(), 1_005);

        clock.set(900);
        assert_eq!(clock.now_millis(), 900);
    }
}
