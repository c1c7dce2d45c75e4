//! Improvement report and trigger labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImprovementError;

/// What caused an improvement pass to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    /// A whole world was generated.
    WorldGeneration,
    /// Storylets were generated by an AI collaborator.
    AiGeneration,
    /// An author committed hand-written storylets.
    AuthorCommit,
    /// The world was topped up with generated storylets.
    PopulateStorylets,
    /// Storylets were generated to fill a specific gap.
    TargetedGeneration,
    /// A maintenance run over the whole graph.
    BulkFix,
    /// An operator ran the engine by hand.
    Manual,
}

impl Trigger {
    /// Every trigger label, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::WorldGeneration,
        Self::AiGeneration,
        Self::AuthorCommit,
        Self::PopulateStorylets,
        Self::TargetedGeneration,
        Self::BulkFix,
        Self::Manual,
    ];

    /// The wire label for this trigger.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorldGeneration => "world-generation",
            Self::AiGeneration => "ai-generation",
            Self::AuthorCommit => "author-commit",
            Self::PopulateStorylets => "populate-storylets",
            Self::TargetedGeneration => "targeted-generation",
            Self::BulkFix => "bulk-fix",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = ImprovementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == s)
            .ok_or_else(|| ImprovementError::Configuration(format!("unknown trigger label '{s}'")))
    }
}

/// Outcome of one improvement pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementReport {
    /// What caused the pass.
    pub trigger: Trigger,
    /// Number of batch storylets found in the graph.
    pub storylets_processed: usize,
    /// Storylets that received a coordinate.
    pub coordinates_assigned: usize,
    /// Isolated storylets given an exit choice.
    pub isolated_fixed: usize,
    /// Return choices added for one-way edges.
    pub return_paths_added: usize,
    /// Storylets created to consume dead-end variables.
    pub variable_storylets_created: usize,
    /// Bridge storylets inserted into abrupt transitions.
    pub bridges_inserted: usize,
    /// Choices annotated with a destination preview.
    pub previews_updated: usize,
    /// True when the pass finished with no recorded errors.
    pub success: bool,
    /// Recovered errors, in the order they happened.
    pub errors: Vec<String>,
    /// True when no mutation was committed.
    pub dry_run: bool,
}

impl ImprovementReport {
    /// Creates an empty, successful report.
    #[must_use]
    pub fn new(trigger: Trigger, dry_run: bool) -> Self {
        Self {
            trigger,
            storylets_processed: 0,
            coordinates_assigned: 0,
            isolated_fixed: 0,
            return_paths_added: 0,
            variable_storylets_created: 0,
            bridges_inserted: 0,
            previews_updated: 0,
            success: true,
            errors: Vec::new(),
            dry_run,
        }
    }

    /// Downgrades an error to a report entry.
    pub fn record(&mut self, error: &ImprovementError) {
        self.errors.push(error.to_string());
        self.success = false;
    }

    /// Records every error in order.
    pub fn record_all<'a>(&mut self, errors: impl IntoIterator<Item = &'a ImprovementError>) {
        for error in errors {
            self.record(error);
        }
    }

    /// Sum of all repair counts.
    #[must_use]
    pub fn total_improvements(&self) -> usize {
        self.coordinates_assigned
            + self.isolated_fixed
            + self.return_paths_added
            + self.variable_storylets_created
            + self.bridges_inserted
            + self.previews_updated
    }

    /// Human-readable one-line summary for authoring tools.
    #[must_use]
    pub fn summary(&self) -> String {
        if !self.success && self.total_improvements() == 0 {
            let first = self.errors.first().map_or("unknown error", String::as_str);
            return format!("Auto-improvement failed: {first}");
        }

        let mut parts = Vec::new();

        let mut smoothing = Vec::new();
        push_count(&mut smoothing, self.isolated_fixed, "exit choices");
        push_count(&mut smoothing, self.variable_storylets_created, "variable storylets");
        push_count(&mut smoothing, self.return_paths_added, "return paths");
        if !smoothing.is_empty() {
            parts.push(format!("Smoothing: {}", smoothing.join(", ")));
        }

        let mut deepening = Vec::new();
        push_count(&mut deepening, self.bridges_inserted, "bridge storylets");
        push_count(&mut deepening, self.previews_updated, "choice previews");
        if !deepening.is_empty() {
            parts.push(format!("Deepening: {}", deepening.join(", ")));
        }

        if self.coordinates_assigned > 0 {
            parts.insert(0, format!("Spatial: {} coordinates", self.coordinates_assigned));
        }

        if parts.is_empty() {
            return "No improvements needed - storylet graph is healthy".to_owned();
        }

        let mut summary = format!(
            "Auto-improved ({} total): {}",
            self.total_improvements(),
            parts.join(" | ")
        );
        if !self.errors.is_empty() {
            summary.push_str(&format!(" [{} errors]", self.errors.len()));
        }
        if self.dry_run {
            summary.push_str(" [dry run]");
        }
        summary
    }
}

fn push_count(parts: &mut Vec<String>, count: usize, label: &str) {
    if count > 0 {
        parts.push(format!("{count} {label}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storylet::StoryletId;

    #[test]
    fn test_trigger_labels_round_trip_through_from_str() {
        for trigger in Trigger::ALL {
            assert_eq!(trigger.as_str().parse::<Trigger>().unwrap(), trigger);
        }
        assert!("anything-goes".parse::<Trigger>().is_err());
    }

    #[test]
    fn test_trigger_serializes_as_kebab_case_label() {
        let json = serde_json::to_value(Trigger::AuthorCommit).unwrap();
        assert_eq!(json, "author-commit");
    }

    #[test]
    fn test_record_marks_report_unsuccessful() {
        let mut report = ImprovementReport::new(Trigger::Manual, false);
        assert!(report.success);

        report.record(&ImprovementError::UnknownStorylet(StoryletId(9)));

        assert!(!report.success);
        assert_eq!(report.errors, vec!["unknown storylet: #9".to_owned()]);
    }

    #[test]
    fn test_summary_for_healthy_graph() {
        let report = ImprovementReport::new(Trigger::AuthorCommit, false);
        assert_eq!(
            report.summary(),
            "No improvements needed - storylet graph is healthy"
        );
    }

    #[test]
    fn test_summary_lists_each_category() {
        let mut report = ImprovementReport::new(Trigger::AiGeneration, true);
        report.coordinates_assigned = 2;
        report.isolated_fixed = 1;
        report.return_paths_added = 3;
        report.bridges_inserted = 1;

        assert_eq!(report.total_improvements(), 7);
        assert_eq!(
            report.summary(),
            "Auto-improved (7 total): Spatial: 2 coordinates | \
             Smoothing: 1 exit choices, 3 return paths | \
             Deepening: 1 bridge storylets [dry run]"
        );
    }

    #[test]
    fn test_summary_reports_failure_without_improvements() {
        let mut report = ImprovementReport::new(Trigger::Manual, false);
        report.record(&ImprovementError::Store("disk full".to_owned()));

        assert_eq!(
            report.summary(),
            "Auto-improvement failed: store error: disk full"
        );
    }
}
