//! Story smoothing: connectivity and variable-consistency repair.
//!
//! Three repairs run in order over the current graph:
//!
//! 1. isolated storylets get an exit to the nearest connected storylet;
//! 2. dead-end variables get a consuming storylet reachable from a setter;
//! 3. every edge without a way back gets a return choice, unless the edge
//!    is marked one-way.
//!
//! A storylet still stranded afterwards, typically the far end of a one-way
//! edge, gets an exit to the nearest connected storylet, and that exit gets
//! its own return path.
//!
//! Hitting the synthesis cap while creating consumers ends the phase there;
//! return paths and stranded exits wait for the next pass.
//!
//! Every node and edge created here is marked synthesized.

use std::collections::BTreeSet;

use tracing::{debug, warn};
use worldweaver_core::error::ImprovementError;
use worldweaver_core::graph::WorldGraph;
use worldweaver_core::storylet::{Choice, Coordinate, Storylet, StoryletId};

use super::analysis::VariableUsage;
use super::budget::SynthesisBudget;
use super::spatial::SpatialNavigator;

/// Phase label used in synthesis-limit errors.
pub const PHASE: &str = "smoothing";

/// Repairs made by one smoothing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmoothingCounts {
    pub isolated_fixed: usize,
    pub return_paths_added: usize,
    pub variable_storylets_created: usize,
}

/// Counts plus the fixes that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmoothingOutcome {
    pub counts: SmoothingCounts,
    pub errors: Vec<ImprovementError>,
}

/// Repairs isolation, dead-end variables and missing return paths.
#[derive(Debug, Clone, Copy)]
pub struct StorySmoother<'m> {
    navigator: SpatialNavigator<'m>,
}

impl<'m> StorySmoother<'m> {
    /// Creates a smoother placing new storylets through `navigator`.
    #[must_use]
    pub fn new(navigator: SpatialNavigator<'m>) -> Self {
        Self { navigator }
    }

    /// Runs the repairs in order. Individual fixes that cannot be made are
    /// recorded and skipped; the run itself never fails.
    pub fn smooth(&self, graph: &mut WorldGraph, budget: &mut SynthesisBudget<'_>) -> SmoothingOutcome {
        let mut outcome = SmoothingOutcome::default();
        self.fix_isolation(graph, &mut outcome);
        if self.fix_dead_end_variables(graph, budget, &mut outcome) {
            debug!("synthesis cap reached; ending smoothing early");
            return outcome;
        }
        Self::add_return_paths(graph, &mut outcome);
        if Self::fix_stranded(graph, &mut outcome) > 0 {
            Self::add_return_paths(graph, &mut outcome);
        }
        outcome
    }

    fn fix_isolation(&self, graph: &mut WorldGraph, outcome: &mut SmoothingOutcome) {
        let mut connected = connected_ids(graph);

        for id in graph.ids() {
            if !graph.is_isolated(id) {
                continue;
            }
            let Some(origin) = graph.get(id).and_then(|s| s.coordinate) else {
                outcome.errors.push(ImprovementError::Unplaced(id));
                continue;
            };

            let Some(target) = nearest_exit(graph, &connected, id, origin) else {
                let error = ImprovementError::NoRepairTarget {
                    storylet_id: id,
                    reason: "no other placed storylet to connect to".to_owned(),
                };
                warn!(%error, "isolated storylet left unconnected");
                outcome.errors.push(error);
                continue;
            };

            if add_exit(graph, id, target, outcome) {
                debug!(storylet_id = %id, %target, "added exit to isolated storylet");
                connected.insert(id);
                connected.insert(target);
            }
        }
    }

    /// Gives every connected storylet that leads nowhere and never ends its
    /// thread an exit. Returns the number of exits added.
    fn fix_stranded(graph: &mut WorldGraph, outcome: &mut SmoothingOutcome) -> usize {
        let before = outcome.counts.isolated_fixed;

        for id in graph.ids() {
            // Isolated storylets were already handled, successfully or not.
            if graph.is_isolated(id) || !graph.is_stranded(id) {
                continue;
            }
            let Some(origin) = graph.get(id).and_then(|s| s.coordinate) else {
                outcome.errors.push(ImprovementError::Unplaced(id));
                continue;
            };
            let connected = connected_ids(graph);
            let Some(target) = nearest_exit(graph, &connected, id, origin) else {
                outcome.errors.push(ImprovementError::NoRepairTarget {
                    storylet_id: id,
                    reason: "no other placed storylet to lead to".to_owned(),
                });
                continue;
            };
            if add_exit(graph, id, target, outcome) {
                debug!(storylet_id = %id, %target, "added exit to stranded storylet");
            }
        }

        outcome.counts.isolated_fixed - before
    }

    /// Returns true if the synthesis cap stopped consumer creation.
    fn fix_dead_end_variables(
        &self,
        graph: &mut WorldGraph,
        budget: &mut SynthesisBudget<'_>,
        outcome: &mut SmoothingOutcome,
    ) -> bool {
        let dead_ends = VariableUsage::of(graph).dead_ends();

        for (index, (variable, setter_id)) in dead_ends.iter().enumerate() {
            let Some(setter) = graph.get(*setter_id) else {
                continue;
            };
            let value = setter.effects.get(variable).cloned().unwrap_or_default();
            let location = setter.location.clone();
            let preferred = setter
                .coordinate
                .unwrap_or_else(|| self.navigator.mapper().map(&location));

            let new_id = graph.next_id();
            let cell = match self.navigator.place_near(graph, preferred, new_id) {
                Ok(cell) => cell,
                Err(error) => {
                    outcome.errors.push(error);
                    continue;
                }
            };

            if !budget.reserve() {
                let unresolved = dead_ends[index..]
                    .iter()
                    .map(|(v, _)| format!("dead-end variable {v}"))
                    .collect();
                outcome.errors.push(budget.exceeded(PHASE, unresolved));
                return true;
            }

            let words = variable.replace('_', " ");
            let mut consumer = Storylet::new(new_id, format!("{} Advantage", title_case(&words)), location);
            consumer.text = format!("Your {words} proves beneficial in this situation.");
            consumer.coordinate = Some(cell);
            consumer.requires.insert(variable.clone(), value.clone());
            consumer
                .choices
                .push(Choice::synthesized("Continue your journey", *setter_id));
            let consumer_id = graph.add_synthesized(consumer);

            let entry = Choice::synthesized(format!("Make use of your {words}"), consumer_id)
                .when(variable.clone(), value);
            if let Err(error) = graph.add_choice(*setter_id, entry) {
                outcome.errors.push(error);
                continue;
            }

            debug!(%variable, setter = %setter_id, storylet_id = %consumer_id, "created consumer for dead-end variable");
            outcome.counts.variable_storylets_created += 1;
        }
        false
    }

    fn add_return_paths(graph: &mut WorldGraph, outcome: &mut SmoothingOutcome) {
        for edge in graph.edges() {
            if edge.from == edge.target {
                continue;
            }
            let (Some(from), Some(target)) = (graph.get(edge.from), graph.get(edge.target)) else {
                continue;
            };
            if from.choices[edge.choice_index].no_return || target.leads_to(edge.from) {
                continue;
            }

            let text = format!("Return to {}", from.place_name());
            match graph.add_choice(edge.target, Choice::synthesized(text, edge.from)) {
                Ok(()) => outcome.counts.return_paths_added += 1,
                Err(error) => outcome.errors.push(error),
            }
        }
    }
}

/// Adds a synthesized "Travel to" choice from `id` to `target`, counting it
/// as an isolation fix.
fn add_exit(
    graph: &mut WorldGraph,
    id: StoryletId,
    target: StoryletId,
    outcome: &mut SmoothingOutcome,
) -> bool {
    let text = graph
        .get(target)
        .map(|t| format!("Travel to {}", t.place_name()))
        .unwrap_or_default();
    match graph.add_choice(id, Choice::synthesized(text, target)) {
        Ok(()) => {
            outcome.counts.isolated_fixed += 1;
            true
        }
        Err(error) => {
            outcome.errors.push(error);
            false
        }
    }
}

/// Storylets with at least one edge to or from another existing storylet.
fn connected_ids(graph: &WorldGraph) -> BTreeSet<StoryletId> {
    graph
        .edges()
        .into_iter()
        .filter(|edge| edge.from != edge.target && graph.contains(edge.target))
        .flat_map(|edge| [edge.from, edge.target])
        .collect()
}

/// Closest placed storylet other than `id`, preferring connected ones.
/// Ties go to the lowest id.
fn nearest_exit(
    graph: &WorldGraph,
    connected: &BTreeSet<StoryletId>,
    id: StoryletId,
    origin: Coordinate,
) -> Option<StoryletId> {
    let nearest = |only_connected: bool| {
        graph
            .storylets()
            .filter(|s| s.id != id)
            .filter(|s| !only_connected || connected.contains(&s.id))
            .filter_map(|s| s.coordinate.map(|c| (origin.distance_squared(c), s.id)))
            .min()
            .map(|(_, candidate)| candidate)
    };
    nearest(true).or_else(|| nearest(false))
}

fn title_case(words: &str) -> String {
    words
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
