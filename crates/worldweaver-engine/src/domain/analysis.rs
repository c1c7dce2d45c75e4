//! Gap analysis over a world graph.
//!
//! Read-only: reports the defects the smoother repairs, plus variable
//! usage statistics for authoring tools.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use worldweaver_core::graph::WorldGraph;
use worldweaver_core::storylet::StoryletId;

/// Which storylets set and consume each variable.
///
/// A variable is consumed by a storylet precondition or by a choice
/// condition, and set by a storylet effect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableUsage {
    /// Variable → storylets consuming it.
    pub required: BTreeMap<String, BTreeSet<StoryletId>>,
    /// Variable → storylets assigning it.
    pub set: BTreeMap<String, BTreeSet<StoryletId>>,
}

impl VariableUsage {
    /// Collects variable usage across the graph.
    #[must_use]
    pub fn of(graph: &WorldGraph) -> Self {
        let mut usage = Self::default();
        for storylet in graph.storylets() {
            let consumed = storylet
                .requires
                .keys()
                .chain(storylet.choices.iter().flat_map(|c| c.condition.keys()));
            for variable in consumed {
                usage
                    .required
                    .entry(variable.clone())
                    .or_default()
                    .insert(storylet.id);
            }
            for variable in storylet.effects.keys() {
                usage
                    .set
                    .entry(variable.clone())
                    .or_default()
                    .insert(storylet.id);
            }
        }
        usage
    }

    /// Variables assigned somewhere but never consumed, each with its
    /// lowest-id setter, in name order.
    #[must_use]
    pub fn dead_ends(&self) -> Vec<(String, StoryletId)> {
        self.set
            .iter()
            .filter(|(variable, _)| !self.required.contains_key(*variable))
            .filter_map(|(variable, setters)| {
                setters.first().map(|setter| (variable.clone(), *setter))
            })
            .collect()
    }

    /// Variables consumed somewhere but never assigned, in name order.
    #[must_use]
    pub fn missing_setters(&self) -> Vec<String> {
        self.required
            .keys()
            .filter(|variable| !self.set.contains_key(*variable))
            .cloned()
            .collect()
    }

    /// Fraction of consumed variables that something assigns; `0.0` when
    /// nothing is consumed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn connectivity_score(&self) -> f64 {
        let satisfied = self
            .required
            .keys()
            .filter(|variable| self.set.contains_key(*variable))
            .count();
        satisfied as f64 / self.required.len().max(1) as f64
    }
}

/// A directed edge between two storylets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct EdgeRef {
    pub from: StoryletId,
    pub to: StoryletId,
}

/// Snapshot of a world's structural health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphAnalysis {
    pub total_storylets: usize,
    pub synthesized_storylets: usize,
    pub variables_required: BTreeMap<String, BTreeSet<StoryletId>>,
    pub variables_set: BTreeMap<String, BTreeSet<StoryletId>>,
    /// Consumed but never assigned.
    pub missing_setters: Vec<String>,
    /// Assigned but never consumed (dead-end variables).
    pub unused_setters: Vec<String>,
    /// Storylets nothing else leads to.
    pub without_inbound: Vec<StoryletId>,
    pub isolated: Vec<StoryletId>,
    /// Storylets with no coordinate yet.
    pub unplaced: Vec<StoryletId>,
    /// Edges lacking a way back and not marked one-way.
    pub missing_return_paths: Vec<EdgeRef>,
    pub connectivity_score: f64,
    /// Dangling choice targets.
    pub integrity_errors: Vec<String>,
}

impl GraphAnalysis {
    /// Analyses the graph.
    #[must_use]
    pub fn of(graph: &WorldGraph) -> Self {
        let usage = VariableUsage::of(graph);

        let without_inbound = graph
            .ids()
            .into_iter()
            .filter(|id| graph.inbound_sources(*id).is_empty())
            .collect();
        let isolated = graph
            .ids()
            .into_iter()
            .filter(|id| graph.is_isolated(*id))
            .collect();
        let unplaced = graph
            .storylets()
            .filter(|s| s.coordinate.is_none())
            .map(|s| s.id)
            .collect();

        let missing_return_paths: BTreeSet<EdgeRef> = graph
            .edges()
            .into_iter()
            .filter(|edge| edge.from != edge.target)
            .filter(|edge| {
                graph.get(edge.from).is_some_and(|s| !s.choices[edge.choice_index].no_return)
            })
            .filter(|edge| {
                graph
                    .get(edge.target)
                    .is_some_and(|target| !target.leads_to(edge.from))
            })
            .map(|edge| EdgeRef {
                from: edge.from,
                to: edge.target,
            })
            .collect();

        Self {
            total_storylets: graph.len(),
            synthesized_storylets: graph.storylets().filter(|s| s.synthesized).count(),
            missing_setters: usage.missing_setters(),
            unused_setters: usage.dead_ends().into_iter().map(|(v, _)| v).collect(),
            connectivity_score: usage.connectivity_score(),
            variables_required: usage.required,
            variables_set: usage.set,
            without_inbound,
            isolated,
            unplaced,
            missing_return_paths: missing_return_paths.into_iter().collect(),
            integrity_errors: graph
                .integrity_errors()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Returns true when no repairable defect remains.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.unused_setters.is_empty()
            && self.isolated.is_empty()
            && self.missing_return_paths.is_empty()
            && self.integrity_errors.is_empty()
    }

    /// Analysis as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
