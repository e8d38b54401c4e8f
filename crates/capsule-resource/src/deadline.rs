//! Wall-clock deadline checking.
//!
//! The deadline is enforced cooperatively: [`DeadlineChecker::check`] runs
//! at every host-call boundary and nowhere else. The time source is
//! injectable so tests can drive the clock deterministically; the default
//! source is a monotonic [`Instant`] anchor.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::warn;

/// Signal raised when the wall-clock budget is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution deadline exceeded: {elapsed_ms}ms elapsed, limit {limit_ms}ms")]
pub struct DeadlineExceeded {
    /// Milliseconds elapsed when the check fired.
    pub elapsed_ms: u64,
    /// The configured budget in milliseconds.
    pub limit_ms: u64,
}

/// Caller-supplied time source returning milliseconds.
pub type TimeSourceFn = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Where the checker reads the current time from.
#[derive(Clone)]
pub enum TimeSource {
    /// Monotonic clock, anchored at source construction.
    Monotonic(Instant),
    /// Injected closure returning milliseconds.
    Injected(TimeSourceFn),
}

impl TimeSource {
    /// A monotonic source anchored now.
    pub fn monotonic() -> Self {
        TimeSource::Monotonic(Instant::now())
    }

    /// An injected source.
    pub fn injected(f: TimeSourceFn) -> Self {
        TimeSource::Injected(f)
    }

    fn now_ms(&self) -> u64 {
        match self {
            TimeSource::Monotonic(anchor) => anchor.elapsed().as_millis() as u64,
            TimeSource::Injected(f) => f(),
        }
    }
}

impl std::fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSource::Monotonic(anchor) => f.debug_tuple("Monotonic").field(anchor).finish(),
            TimeSource::Injected(_) => f.debug_tuple("Injected").finish(),
        }
    }
}

/// Checks elapsed wall-clock time against a budget.
///
/// `elapsed == limit` passes; the first check past the limit latches the
/// checker timed-out. [`DeadlineChecker::start`] re-entry clears the latch.
#[derive(Debug, Clone)]
pub struct DeadlineChecker {
    limit_ms: u64,
    source: TimeSource,
    base_ms: u64,
    timed_out: bool,
}

impl DeadlineChecker {
    /// Create a checker over the monotonic clock.
    pub fn new(limit_ms: u64) -> Self {
        Self::with_source(limit_ms, TimeSource::monotonic())
    }

    /// Create a checker over an explicit time source.
    pub fn with_source(limit_ms: u64, source: TimeSource) -> Self {
        Self {
            limit_ms,
            source,
            base_ms: 0,
            timed_out: false,
        }
    }

    /// Record the base timestamp and clear the timed-out latch.
    pub fn start(&mut self) {
        self.base_ms = self.source.now_ms();
        self.timed_out = false;
    }

    /// Milliseconds elapsed since [`start`](Self::start).
    pub fn elapsed_ms(&self) -> u64 {
        self.source.now_ms().saturating_sub(self.base_ms)
    }

    /// The configured budget.
    pub fn limit_ms(&self) -> u64 {
        self.limit_ms
    }

    /// Whether the checker has latched timed-out.
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Check the deadline.
    pub fn check(&mut self) -> Result<(), DeadlineExceeded> {
        let elapsed_ms = self.elapsed_ms();
        if self.timed_out || elapsed_ms > self.limit_ms {
            self.timed_out = true;
            warn!(elapsed_ms, limit_ms = self.limit_ms, "Deadline exceeded");
            return Err(DeadlineExceeded {
                elapsed_ms,
                limit_ms: self.limit_ms,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn stepped_clock(values: Vec<u64>) -> TimeSourceFn {
        let values = Mutex::new(values.into_iter());
        let last = Mutex::new(0u64);
        Arc::new(move || {
            let mut iter = values.lock();
            match iter.next() {
                Some(v) => {
                    *last.lock() = v;
                    v
                }
                None => *last.lock(),
            }
        })
    }

    #[test]
    fn test_within_budget() {
        let clock = stepped_clock(vec![0, 50, 99]);
        let mut checker = DeadlineChecker::with_source(100, TimeSource::injected(clock));
        checker.start();
        checker.check().unwrap();
        checker.check().unwrap();
    }

    #[test]
    fn test_exact_limit_passes() {
        let clock = stepped_clock(vec![0, 100]);
        let mut checker = DeadlineChecker::with_source(100, TimeSource::injected(clock));
        checker.start();
        checker.check().unwrap();
    }

    #[test]
    fn test_one_past_limit_fails() {
        let clock = stepped_clock(vec![0, 101]);
        let mut checker = DeadlineChecker::with_source(100, TimeSource::injected(clock));
        checker.start();
        let err = checker.check().unwrap_err();
        assert_eq!(
            err,
            DeadlineExceeded {
                elapsed_ms: 101,
                limit_ms: 100
            }
        );
        assert!(checker.is_timed_out());
    }

    #[test]
    fn test_latch_holds_once_timed_out() {
        let clock = stepped_clock(vec![0, 200, 0]);
        let mut checker = DeadlineChecker::with_source(100, TimeSource::injected(clock));
        checker.start();
        checker.check().unwrap_err();
        // Clock went backwards, but the latch holds.
        assert!(checker.check().is_err());
    }

    #[test]
    fn test_start_clears_latch() {
        let clock = stepped_clock(vec![0, 200, 300, 350]);
        let mut checker = DeadlineChecker::with_source(100, TimeSource::injected(clock));
        checker.start();
        checker.check().unwrap_err();

        checker.start(); // base becomes 300
        checker.check().unwrap(); // elapsed 50
    }

    #[test]
    fn test_elapsed_saturates_on_backward_clock() {
        let clock = stepped_clock(vec![100, 40]);
        let mut checker = DeadlineChecker::with_source(10, TimeSource::injected(clock));
        checker.start();
        assert_eq!(checker.elapsed_ms(), 0);
    }

    #[test]
    fn test_monotonic_source_smoke() {
        let mut checker = DeadlineChecker::new(60_000);
        checker.start();
        checker.check().unwrap();
    }
}
