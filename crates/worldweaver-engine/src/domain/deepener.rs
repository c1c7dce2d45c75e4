//! Story deepening: narrative-continuity repair.
//!
//! Runs after smoothing. Authored transitions that jump too far on the grid
//! or share too little vocabulary get a bridge storylet spliced in, and
//! targeted choices get a cached destination preview. Hitting the synthesis
//! cap ends the phase: remaining transitions stay unbridged and no previews
//! are added.

use std::collections::BTreeSet;

use tracing::debug;
use worldweaver_core::error::ImprovementError;
use worldweaver_core::graph::{Edge, WorldGraph};
use worldweaver_core::storylet::{Choice, Storylet, StoryletId};

use super::budget::SynthesisBudget;
use super::spatial::SpatialNavigator;

/// Phase label used in synthesis-limit errors.
pub const PHASE: &str = "deepening";

/// Words too common to say anything about continuity.
const STOP_WORDS: &[&str] = &[
    "the", "and", "you", "your", "for", "are", "but", "not", "with", "this", "that", "from",
    "into", "onto", "out", "has", "have", "had", "was", "were", "its", "his", "her", "they",
    "them", "their", "there", "here", "what", "when", "where", "which", "who", "will", "can",
    "all", "any", "some", "one", "now", "then", "than", "too", "very",
];

/// Thresholds for the deepening pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeepenerConfig {
    /// A transition longer than this (Euclidean, grid cells) is abrupt.
    pub max_step_distance: f64,
    /// A transition whose content-token Jaccard overlap falls below this is
    /// abrupt.
    pub min_token_overlap: f64,
    /// Bridges inserted per pass; further abrupt transitions wait for the
    /// next pass.
    pub max_bridges_per_pass: usize,
    /// Whether to annotate choices with destination previews.
    pub add_previews: bool,
}

impl Default for DeepenerConfig {
    fn default() -> Self {
        Self {
            max_step_distance: 3.0,
            min_token_overlap: 0.1,
            max_bridges_per_pass: 3,
            add_previews: true,
        }
    }
}

/// Why a transition was judged abrupt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Abruptness {
    /// Grid distance between the endpoints.
    Distance(f64),
    /// Token overlap between the endpoints' content.
    Continuity(f64),
}

/// Repairs made by one deepening run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeepeningCounts {
    pub bridges_inserted: usize,
    pub previews_updated: usize,
}

/// Counts plus the fixes that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepeningOutcome {
    pub counts: DeepeningCounts,
    pub errors: Vec<ImprovementError>,
}

/// Inserts bridge storylets and choice previews.
#[derive(Debug, Clone, Copy)]
pub struct StoryDeepener<'m> {
    navigator: SpatialNavigator<'m>,
    config: DeepenerConfig,
}

impl<'m> StoryDeepener<'m> {
    #[must_use]
    pub fn new(navigator: SpatialNavigator<'m>, config: DeepenerConfig) -> Self {
        Self { navigator, config }
    }

    /// Bridges abrupt transitions, then fills in missing previews.
    pub fn deepen(&self, graph: &mut WorldGraph, budget: &mut SynthesisBudget<'_>) -> DeepeningOutcome {
        let mut outcome = DeepeningOutcome::default();
        if self.insert_bridges(graph, budget, &mut outcome) {
            debug!("synthesis cap reached; ending deepening early");
            return outcome;
        }
        if self.config.add_previews {
            outcome.counts.previews_updated = add_previews(graph);
        }
        outcome
    }

    /// Authored transitions judged abrupt, in (source, choice) order.
    #[must_use]
    pub fn abrupt_edges(&self, graph: &WorldGraph) -> Vec<(Edge, Abruptness)> {
        graph
            .edges()
            .into_iter()
            .filter_map(|edge| self.abruptness(graph, &edge).map(|why| (edge, why)))
            .collect()
    }

    /// Judges one edge. Synthesized choices, synthesized or unplaced
    /// endpoints and self-loops are never abrupt.
    #[must_use]
    pub fn abruptness(&self, graph: &WorldGraph, edge: &Edge) -> Option<Abruptness> {
        if edge.from == edge.target {
            return None;
        }
        let from = graph.get(edge.from)?;
        let to = graph.get(edge.target)?;
        if from.choices.get(edge.choice_index)?.synthesized || from.synthesized || to.synthesized {
            return None;
        }

        let distance = from.coordinate?.distance(to.coordinate?);
        if distance > self.config.max_step_distance {
            return Some(Abruptness::Distance(distance));
        }

        token_overlap(from, to)
            .filter(|overlap| *overlap < self.config.min_token_overlap)
            .map(Abruptness::Continuity)
    }

    /// Returns true if the synthesis cap stopped bridging.
    fn insert_bridges(
        &self,
        graph: &mut WorldGraph,
        budget: &mut SynthesisBudget<'_>,
        outcome: &mut DeepeningOutcome,
    ) -> bool {
        let abrupt = self.abrupt_edges(graph);

        for (index, (edge, why)) in abrupt.iter().enumerate() {
            if outcome.counts.bridges_inserted >= self.config.max_bridges_per_pass {
                debug!(
                    deferred = abrupt.len() - index,
                    "bridge cap reached; remaining abrupt transitions wait for the next pass"
                );
                break;
            }

            let (Some(from), Some(to)) = (graph.get(edge.from), graph.get(edge.target)) else {
                continue;
            };
            let (Some(a), Some(b)) = (from.coordinate, to.coordinate) else {
                continue;
            };
            let from_place = from.place_name().to_owned();
            let to_place = to.place_name().to_owned();
            let no_return = from.choices[edge.choice_index].no_return;

            let new_id = graph.next_id();
            let cell = match self.navigator.place_near(graph, a.midpoint(b), new_id) {
                Ok(cell) => cell,
                Err(error) => {
                    outcome.errors.push(error);
                    continue;
                }
            };

            if !budget.reserve() {
                let unresolved = abrupt[index..]
                    .iter()
                    .map(|(e, _)| format!("abrupt transition {} -> {}", e.from, e.target))
                    .collect();
                outcome.errors.push(budget.exceeded(PHASE, unresolved));
                return true;
            }

            let mut bridge = Storylet::new(
                new_id,
                format!("On the Way to {to_place}"),
                format!("Path from {from_place} to {to_place}"),
            );
            bridge.text = format!("You leave {from_place} behind and make your way toward {to_place}.");
            bridge.coordinate = Some(cell);
            let mut onward = Choice::synthesized(format!("Continue to {to_place}"), edge.target);
            onward.no_return = no_return;
            bridge.choices.push(onward);
            let bridge_id = graph.add_synthesized(bridge);

            if let Some(choice) = graph
                .get_mut(edge.from)
                .and_then(|s| s.choices.get_mut(edge.choice_index))
            {
                choice.target = Some(bridge_id);
            }

            debug!(from = %edge.from, to = %edge.target, bridge = %bridge_id, reason = ?why, "inserted bridge storylet");
            outcome.counts.bridges_inserted += 1;
        }
        false
    }
}

/// Caches a destination preview on every targeted choice lacking one.
/// Returns the number of choices annotated.
fn add_previews(graph: &mut WorldGraph) -> usize {
    let mut pending = Vec::new();
    for storylet in graph.storylets() {
        for (index, choice) in storylet.choices.iter().enumerate() {
            if choice.preview.is_some() {
                continue;
            }
            if let Some(preview) = graph.live_preview(choice) {
                pending.push((storylet.id, index, preview));
            }
        }
    }

    let count = pending.len();
    for (id, index, preview) in pending {
        if let Some(choice) = graph.get_mut(id).and_then(|s| s.choices.get_mut(index)) {
            choice.preview = Some(preview);
        }
    }
    count
}

/// Jaccard overlap of the two storylets' content tokens, or `None` when
/// either has no content tokens.
#[allow(clippy::cast_precision_loss)]
fn token_overlap(a: &Storylet, b: &Storylet) -> Option<f64> {
    let left = content_tokens(a);
    let right = content_tokens(b);
    if left.is_empty() || right.is_empty() {
        return None;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    Some(shared as f64 / union as f64)
}

fn content_tokens(storylet: &Storylet) -> BTreeSet<String> {
    format!("{} {}", storylet.title, storylet.text)
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3 && !STOP_WORDS.contains(word))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use worldweaver_core::storylet::Coordinate;
    use worldweaver_test_support::{FixedClock, StoryletBuilder, fixed_now, graph_of};

    use super::*;
    use crate::domain::location::LocationMapper;
    use crate::domain::spatial::DEFAULT_MAX_SEARCH_RADIUS;

    fn deepener(mapper: &LocationMapper) -> StoryDeepener<'_> {
        StoryDeepener::new(
            SpatialNavigator::new(mapper, DEFAULT_MAX_SEARCH_RADIUS),
            DeepenerConfig::default(),
        )
    }

    fn near_pair() -> WorldGraph {
        graph_of([
            StoryletBuilder::new(1, "Square")
                .text("Lanterns glow over the market stalls.")
                .at(0, 0)
                .choice_to(2),
            StoryletBuilder::new(2, "Market")
                .text("Market stalls sell lanterns and rope.")
                .at(1, 1),
        ])
    }

    #[test]
    fn test_far_transition_gets_exactly_one_bridge() {
        // Arrange
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(64, TimeDelta::seconds(5), &clock);
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Square").text("The square bustles.").at(0, 0).choice_to(2),
            StoryletBuilder::new(2, "Frozen Peak").text("The square is far below.").at(0, -6),
        ]);

        // Act
        let outcome = deepener(&mapper).deepen(&mut graph, &mut budget);

        // Assert
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.counts.bridges_inserted, 1);
        let bridge_id = StoryletId(3);
        assert_eq!(graph.get(StoryletId(1)).unwrap().choices[0].target, Some(bridge_id));

        let bridge = graph.get(bridge_id).unwrap();
        assert!(bridge.synthesized);
        assert_eq!(bridge.title, "On the Way to Frozen Peak");
        assert_eq!(bridge.location, "Path from Square to Frozen Peak");
        assert_eq!(
            bridge.text,
            "You leave Square behind and make your way toward Frozen Peak."
        );
        assert_eq!(bridge.coordinate, Some(Coordinate::new(0, -3)));
        assert_eq!(bridge.choices.len(), 1);
        assert_eq!(bridge.choices[0].target, Some(StoryletId(2)));
        assert_eq!(bridge.choices[0].text, "Continue to Frozen Peak");
    }

    #[test]
    fn test_close_transition_with_shared_vocabulary_is_not_abrupt() {
        let mapper = LocationMapper::default();
        let graph = near_pair();

        assert!(deepener(&mapper).abrupt_edges(&graph).is_empty());
    }

    #[test]
    fn test_close_transition_with_disjoint_vocabulary_is_abrupt() {
        let mapper = LocationMapper::default();
        let graph = graph_of([
            StoryletBuilder::new(1, "Square").title("Lantern Square").text("Lanterns glow.").at(0, 0).choice_to(2),
            StoryletBuilder::new(2, "Crypt").title("Bone Crypt").text("Skulls grin.").at(1, 0),
        ]);

        let abrupt = deepener(&mapper).abrupt_edges(&graph);

        assert_eq!(abrupt.len(), 1);
        assert_eq!(abrupt[0].1, Abruptness::Continuity(0.0));
    }

    #[test]
    fn test_continuity_check_needs_tokens_on_both_sides() {
        let mapper = LocationMapper::default();
        let graph = graph_of([
            StoryletBuilder::new(1, "Square").title("A").at(0, 0).choice_to(2),
            StoryletBuilder::new(2, "Crypt").title("Bone Crypt").at(1, 0),
        ]);

        assert!(deepener(&mapper).abrupt_edges(&graph).is_empty());
    }

    #[test]
    fn test_synthesized_choices_and_unplaced_endpoints_are_ignored() {
        let mapper = LocationMapper::default();
        let graph = graph_of([
            StoryletBuilder::new(1, "Square")
                .at(0, 0)
                .with_choice(Choice::synthesized("Travel", StoryletId(2)))
                .choice_to(3),
            StoryletBuilder::new(2, "Peak").at(0, -9),
            StoryletBuilder::new(3, "Somewhere"),
        ]);

        assert!(deepener(&mapper).abrupt_edges(&graph).is_empty());
    }

    #[test]
    fn test_bridge_inherits_one_way_flag() {
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(64, TimeDelta::seconds(5), &clock);
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Cliff").at(0, 0).one_way_to(2),
            StoryletBuilder::new(2, "Sea").at(8, 0),
        ]);

        deepener(&mapper).deepen(&mut graph, &mut budget);

        assert!(graph.get(StoryletId(3)).unwrap().choices[0].no_return);
    }

    #[test]
    fn test_bridges_per_pass_are_capped() {
        // Arrange: four far transitions from the hub.
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(64, TimeDelta::seconds(5), &clock);
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Hub").at(0, 0).choice_to(2).choice_to(3).choice_to(4).choice_to(5),
            StoryletBuilder::new(2, "North").at(0, -10),
            StoryletBuilder::new(3, "South").at(0, 10),
            StoryletBuilder::new(4, "East").at(10, 0),
            StoryletBuilder::new(5, "West").at(-10, 0),
        ]);

        // Act
        let outcome = deepener(&mapper).deepen(&mut graph, &mut budget);

        // Assert
        assert_eq!(outcome.counts.bridges_inserted, 3);
        assert!(outcome.errors.is_empty());
        assert_eq!(graph.get(StoryletId(1)).unwrap().choices[3].target, Some(StoryletId(5)));
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn test_exhausted_budget_stops_bridging_and_lists_remaining_transitions() {
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(0, TimeDelta::seconds(5), &clock);
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Hub").at(0, 0).choice_to(2),
            StoryletBuilder::new(2, "Peak").at(0, -10),
        ]);

        let outcome = deepener(&mapper).deepen(&mut graph, &mut budget);

        assert_eq!(outcome.counts.bridges_inserted, 0);
        assert_eq!(
            outcome.errors,
            vec![ImprovementError::SynthesisLimitExceeded {
                phase: PHASE,
                limit: 0,
                unresolved: vec!["abrupt transition #1 -> #2".to_owned()],
            }]
        );
        assert_eq!(graph.get(StoryletId(1)).unwrap().choices[0].target, Some(StoryletId(2)));
        assert_eq!(outcome.counts.previews_updated, 0);
        assert_eq!(graph.get(StoryletId(1)).unwrap().choices[0].preview, None);
    }

    #[test]
    fn test_failed_placement_does_not_use_up_the_bridge_cap() {
        // Arrange: the first transition's midpoint is taken and cannot move.
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(64, TimeDelta::seconds(5), &clock);
        let deepener = StoryDeepener::new(
            SpatialNavigator::new(&mapper, 0),
            DeepenerConfig {
                max_bridges_per_pass: 1,
                add_previews: false,
                ..DeepenerConfig::default()
            },
        );
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Hub").at(0, 0).choice_to(2).choice_to(3),
            StoryletBuilder::new(2, "North").at(0, -10),
            StoryletBuilder::new(3, "South").at(0, 10),
            StoryletBuilder::new(6, "Boulder").at(0, -5),
        ]);

        // Act
        let outcome = deepener.deepen(&mut graph, &mut budget);

        // Assert
        assert_eq!(outcome.counts.bridges_inserted, 1);
        assert_eq!(
            outcome.errors,
            vec![ImprovementError::Placement {
                storylet_id: StoryletId(7),
                origin: Coordinate::new(0, -5),
                radius: 0,
            }]
        );
        let hub = graph.get(StoryletId(1)).unwrap();
        assert_eq!(hub.choices[0].target, Some(StoryletId(2)));
        assert_eq!(hub.choices[1].target, Some(StoryletId(7)));
    }

    #[test]
    fn test_previews_fill_only_missing_annotations() {
        // Arrange
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(64, TimeDelta::seconds(5), &clock);
        let mut kept = Choice::to("Back", StoryletId(1));
        kept.preview = Some("Town".to_owned());
        let mut graph = near_pair();
        graph
            .get_mut(StoryletId(2))
            .unwrap()
            .choices
            .extend([kept, Choice::terminal("Rest")]);

        // Act
        let outcome = deepener(&mapper).deepen(&mut graph, &mut budget);

        // Assert
        assert_eq!(outcome.counts.previews_updated, 1);
        let choice = &graph.get(StoryletId(1)).unwrap().choices[0];
        assert_eq!(choice.display_label(), "Go to 2 (→ Market)");
        let market = graph.get(StoryletId(2)).unwrap();
        assert_eq!(market.choices[0].preview.as_deref(), Some("Town"));
        assert_eq!(market.choices[1].preview, None);
    }

    #[test]
    fn test_second_deepening_pass_changes_nothing() {
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(64, TimeDelta::seconds(5), &clock);
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Square").at(0, 0).choice_to(2),
            StoryletBuilder::new(2, "Peak").at(0, -6).choice_to(1),
        ]);
        let deepener = deepener(&mapper);
        deepener.deepen(&mut graph, &mut budget);
        let after_first = graph.clone();

        let second = deepener.deepen(&mut graph, &mut budget);

        assert_eq!(second.counts, DeepeningCounts::default());
        assert_eq!(graph, after_first);
    }

    #[test]
    fn test_previews_can_be_disabled() {
        let mapper = LocationMapper::default();
        let clock = FixedClock(fixed_now());
        let mut budget = SynthesisBudget::new(64, TimeDelta::seconds(5), &clock);
        let config = DeepenerConfig {
            add_previews: false,
            ..DeepenerConfig::default()
        };
        let mut graph = near_pair();

        let outcome = StoryDeepener::new(SpatialNavigator::new(&mapper, 20), config)
            .deepen(&mut graph, &mut budget);

        assert_eq!(outcome.counts, DeepeningCounts::default());
        assert_eq!(graph, near_pair());
    }
}
