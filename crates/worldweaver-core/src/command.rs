//! Command abstractions.

use uuid::Uuid;

use crate::report::Trigger;

/// Trait that all engine commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// What caused the command to be issued.
    fn trigger(&self) -> Trigger;
}
