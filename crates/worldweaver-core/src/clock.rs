//! Clock abstraction for wall-clock budgets.

use chrono::{DateTime, TimeDelta, Utc};

/// Abstraction over system time so pass budgets are testable.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A point in time after which an improvement pass must stop synthesizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: DateTime<Utc>,
}

impl Deadline {
    /// Starts a budget of `budget` from the clock's current time.
    #[must_use]
    pub fn after(clock: &dyn Clock, budget: TimeDelta) -> Self {
        Self {
            expires_at: clock.now() + budget,
        }
    }

    /// Returns true once the clock has reached the deadline.
    #[must_use]
    pub fn has_passed(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.expires_at
    }

    /// The instant the budget runs out.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
