//! Synthesis budget for one improvement pass.

use chrono::TimeDelta;
use worldweaver_core::clock::{Clock, Deadline};
use worldweaver_core::error::ImprovementError;

/// Caps how many storylets a pass may synthesize and how long it may run.
///
/// Each synthesized storylet reserves one unit. The clock is read when the
/// budget is created, when a phase asks [`SynthesisBudget::deadline_passed`]
/// and on every reservation.
pub struct SynthesisBudget<'c> {
    limit: usize,
    used: usize,
    deadline: Deadline,
    clock: &'c dyn Clock,
}

impl std::fmt::Debug for SynthesisBudget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisBudget")
            .field("limit", &self.limit)
            .field("used", &self.used)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl<'c> SynthesisBudget<'c> {
    /// Starts a budget of `limit` nodes and `wall_clock` time.
    #[must_use]
    pub fn new(limit: usize, wall_clock: TimeDelta, clock: &'c dyn Clock) -> Self {
        Self {
            limit,
            used: 0,
            deadline: Deadline::after(clock, wall_clock),
            clock,
        }
    }

    /// Claims one synthesized node. Returns false once the node cap is
    /// reached or the deadline has passed.
    pub fn reserve(&mut self) -> bool {
        if self.used >= self.limit || self.deadline.has_passed(self.clock) {
            return false;
        }
        self.used += 1;
        true
    }

    /// Returns true once the wall-clock budget is spent.
    #[must_use]
    pub fn deadline_passed(&self) -> bool {
        self.deadline.has_passed(self.clock)
    }

    /// Nodes reserved so far.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    /// The node cap.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The error recorded when `phase` stops early with `unresolved`
    /// defects left.
    #[must_use]
    pub fn exceeded(&self, phase: &'static str, unresolved: Vec<String>) -> ImprovementError {
        ImprovementError::SynthesisLimitExceeded {
            phase,
            limit: self.limit,
            unresolved,
        }
    }
}
