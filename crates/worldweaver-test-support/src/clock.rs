//! Test clocks: deterministic `Clock` implementations for tests.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use worldweaver_core::clock::Clock;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A clock that advances by a fixed step every time it is read. Used to
/// drive wall-clock budgets to exhaustion without sleeping.
#[derive(Debug)]
pub struct SteppingClock {
    current: Mutex<DateTime<Utc>>,
    step: TimeDelta,
}

impl SteppingClock {
    /// Create a clock starting at `start` that advances `step` per read.
    #[must_use]
    pub fn new(start: DateTime<Utc>, step: TimeDelta) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock().unwrap();
        let now = *current;
        *current = now + self.step;
        now
    }
}
