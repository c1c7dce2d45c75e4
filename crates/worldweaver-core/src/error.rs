//! Engine error types.

use thiserror::Error;

use crate::storylet::{Coordinate, StoryletId};

/// Errors raised while improving a world graph.
///
/// Apart from `Configuration`, every variant is recoverable: the engine
/// records it in the improvement report and keeps going.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImprovementError {
    /// The location keyword table is malformed or missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No free cell was found around the preferred position.
    #[error("placement error: no free cell within radius {radius} of {origin} for storylet {storylet_id}")]
    Placement {
        /// The storylet being placed (or the storylet a bridge was meant for).
        storylet_id: StoryletId,
        /// The preferred cell the search started from.
        origin: Coordinate,
        /// The exhausted search radius.
        radius: u32,
    },

    /// A choice references a storylet that does not exist.
    #[error("graph integrity error: storylet {from} has a choice targeting missing storylet {target}")]
    GraphIntegrity {
        /// The storylet owning the dangling choice.
        from: StoryletId,
        /// The missing target.
        target: StoryletId,
    },

    /// Two storylets in one world share an id.
    #[error("duplicate storylet id: {0}")]
    DuplicateStorylet(StoryletId),

    /// A requested storylet is not part of the graph.
    #[error("unknown storylet: {0}")]
    UnknownStorylet(StoryletId),

    /// A storylet needed a coordinate but has none.
    #[error("storylet {0} has no coordinate")]
    Unplaced(StoryletId),

    /// A fix was skipped because no valid target exists.
    #[error("no repair target for storylet {storylet_id}: {reason}")]
    NoRepairTarget {
        /// The storylet that could not be repaired.
        storylet_id: StoryletId,
        /// Why no target qualified.
        reason: String,
    },

    /// The pass hit its synthesis cap or wall-clock budget.
    #[error("synthesis limit exceeded during {phase} (limit {limit}); unresolved: {}", .unresolved.join(", "))]
    SynthesisLimitExceeded {
        /// Phase that was cut short.
        phase: &'static str,
        /// The configured node cap.
        limit: usize,
        /// Defects left unrepaired.
        unresolved: Vec<String>,
    },

    /// The storylet store failed to persist the pass.
    #[error("store error: {0}")]
    Store(String),
}
