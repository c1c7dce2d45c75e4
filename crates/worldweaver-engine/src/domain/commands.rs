//! Commands for the consistency engine.

use uuid::Uuid;
use worldweaver_core::command::Command;
use worldweaver_core::report::Trigger;
use worldweaver_core::storylet::StoryletId;

/// Which phases of an improvement pass run, and whether it commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImprovementOptions {
    /// Run the story smoother after spatial assignment.
    pub run_smoothing: bool,
    /// Run the story deepener after smoothing.
    pub run_deepening: bool,
    /// Compute every decision but commit nothing.
    pub dry_run: bool,
}

impl Default for ImprovementOptions {
    fn default() -> Self {
        Self {
            run_smoothing: true,
            run_deepening: true,
            dry_run: false,
        }
    }
}

/// Command to run an improvement pass after a batch of storylets was added.
#[derive(Debug, Clone)]
pub struct AutoImprove {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// What caused the batch.
    pub trigger: Trigger,
    /// The storylets just added.
    pub added_storylet_ids: Vec<StoryletId>,
    /// Phase switches and dry-run flag.
    pub options: ImprovementOptions,
}

impl Command for AutoImprove {
    fn command_type(&self) -> &'static str {
        "engine.auto_improve"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn trigger(&self) -> Trigger {
        self.trigger
    }
}

/// Command to assign coordinates across the whole graph.
#[derive(Debug, Clone)]
pub struct FixCoordinates {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Compute assignments but commit nothing.
    pub dry_run: bool,
}

impl Command for FixCoordinates {
    fn command_type(&self) -> &'static str {
        "engine.fix_coordinates"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn trigger(&self) -> Trigger {
        Trigger::BulkFix
    }
}
