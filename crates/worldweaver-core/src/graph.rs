//! The world graph: storylets connected by choices.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::ImprovementError;
use crate::storylet::{Choice, Coordinate, Storylet, StoryletId};

/// A directed edge `from → target` through the choice at `choice_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Source storylet.
    pub from: StoryletId,
    /// Position of the choice in the source's choice list.
    pub choice_index: usize,
    /// Destination storylet.
    pub target: StoryletId,
}

/// Partial update of a stored storylet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryletPatch {
    /// New coordinate, if changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
    /// Replacement choice list, if any existing choice changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,
}

impl StoryletPatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinate.is_none() && self.choices.is_none()
    }
}

/// One mutation needed to bring a store in line with a graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    /// A storylet that did not exist in the baseline.
    Created(Storylet),
    /// A choice appended to an existing storylet.
    ChoiceAdded {
        /// The storylet gaining the choice.
        from: StoryletId,
        /// The new choice.
        choice: Choice,
    },
    /// Fields of an existing storylet that changed in place.
    Updated {
        /// The storylet being updated.
        id: StoryletId,
        /// The changed fields.
        patch: StoryletPatch,
    },
}

/// Directed graph over storylets via their choices.
///
/// Invariant maintained by the engine: every non-null choice target
/// references a storylet in the graph. Graphs loaded from outside are
/// checked with [`WorldGraph::integrity_errors`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Storylet>", into = "Vec<Storylet>")]
pub struct WorldGraph {
    storylets: BTreeMap<StoryletId, Storylet>,
}

/// Loads a world, rejecting a list that repeats an id.
impl TryFrom<Vec<Storylet>> for WorldGraph {
    type Error = ImprovementError;

    fn try_from(storylets: Vec<Storylet>) -> Result<Self, Self::Error> {
        let mut graph = Self::new();
        for storylet in storylets {
            let id = storylet.id;
            if graph.insert(storylet).is_some() {
                return Err(ImprovementError::DuplicateStorylet(id));
            }
        }
        Ok(graph)
    }
}

impl From<WorldGraph> for Vec<Storylet> {
    fn from(graph: WorldGraph) -> Self {
        graph.storylets.into_values().collect()
    }
}

/// Later storylets replace earlier ones with the same id; use `TryFrom` to
/// reject duplicates instead.
impl FromIterator<Storylet> for WorldGraph {
    fn from_iter<I: IntoIterator<Item = Storylet>>(iter: I) -> Self {
        Self {
            storylets: iter.into_iter().map(|s| (s.id, s)).collect(),
        }
    }
}

impl WorldGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storylets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storylets.len()
    }

    /// Returns true if the graph has no storylets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storylets.is_empty()
    }

    /// Returns true if `id` is in the graph.
    #[must_use]
    pub fn contains(&self, id: StoryletId) -> bool {
        self.storylets.contains_key(&id)
    }

    /// Looks up a storylet.
    #[must_use]
    pub fn get(&self, id: StoryletId) -> Option<&Storylet> {
        self.storylets.get(&id)
    }

    /// Looks up a storylet for mutation.
    pub fn get_mut(&mut self, id: StoryletId) -> Option<&mut Storylet> {
        self.storylets.get_mut(&id)
    }

    /// All storylets in ascending id order.
    pub fn storylets(&self) -> impl Iterator<Item = &Storylet> {
        self.storylets.values()
    }

    /// All ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<StoryletId> {
        self.storylets.keys().copied().collect()
    }

    /// Inserts or replaces a storylet under its own id.
    pub fn insert(&mut self, storylet: Storylet) -> Option<Storylet> {
        self.storylets.insert(storylet.id, storylet)
    }

    /// The id the next synthesized storylet will receive.
    #[must_use]
    pub fn next_id(&self) -> StoryletId {
        self.storylets
            .keys()
            .next_back()
            .map_or(StoryletId(1), |last| StoryletId(last.0 + 1))
    }

    /// Adds an engine-created storylet under a fresh id and returns the id.
    pub fn add_synthesized(&mut self, mut storylet: Storylet) -> StoryletId {
        let id = self.next_id();
        storylet.id = id;
        storylet.synthesized = true;
        self.storylets.insert(id, storylet);
        id
    }

    /// Appends a choice to `from`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStorylet` if `from` is missing and `GraphIntegrity` if
    /// the choice targets a missing storylet.
    pub fn add_choice(&mut self, from: StoryletId, choice: Choice) -> Result<(), ImprovementError> {
        if let Some(target) = choice.target
            && !self.contains(target)
        {
            return Err(ImprovementError::GraphIntegrity { from, target });
        }
        self.storylets
            .get_mut(&from)
            .ok_or(ImprovementError::UnknownStorylet(from))?
            .choices
            .push(choice);
        Ok(())
    }

    /// Every choice edge with a target, in (source id, choice index) order.
    /// Self-loops are included.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.storylets
            .values()
            .flat_map(|storylet| {
                storylet
                    .choices
                    .iter()
                    .enumerate()
                    .filter_map(move |(choice_index, choice)| {
                        choice.target.map(|target| Edge {
                            from: storylet.id,
                            choice_index,
                            target,
                        })
                    })
            })
            .collect()
    }

    /// Storylets other than `id` with a choice leading to `id`.
    #[must_use]
    pub fn inbound_sources(&self, id: StoryletId) -> BTreeSet<StoryletId> {
        self.storylets
            .values()
            .filter(|s| s.id != id && s.leads_to(id))
            .map(|s| s.id)
            .collect()
    }

    /// Returns true if `id` has any inbound or outbound edge to another storylet.
    #[must_use]
    pub fn is_connected(&self, id: StoryletId) -> bool {
        self.get(id)
            .is_some_and(|s| s.outbound_targets().any(|t| self.contains(t)))
            || !self.inbound_sources(id).is_empty()
    }

    /// A storylet is isolated when nothing else reaches it and it leads
    /// nowhere but to itself.
    #[must_use]
    pub fn is_isolated(&self, id: StoryletId) -> bool {
        self.contains(id) && !self.is_connected(id)
    }

    /// A storylet is stranded when it leads to no other existing storylet
    /// and has no choice that ends the thread.
    #[must_use]
    pub fn is_stranded(&self, id: StoryletId) -> bool {
        self.get(id).is_some_and(|s| {
            !s.is_terminal() && !s.outbound_targets().any(|t| self.contains(t))
        })
    }

    /// Storylets reachable from `start` by following choices, `start` included.
    #[must_use]
    pub fn reachable_from(&self, start: StoryletId) -> BTreeSet<StoryletId> {
        let mut seen = BTreeSet::new();
        if !self.contains(start) {
            return seen;
        }
        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some(current) = queue.pop_front() {
            let Some(storylet) = self.get(current) else {
                continue;
            };
            for target in storylet.outbound_targets() {
                if self.contains(target) && seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }
        seen
    }

    /// Occupied grid cells. When two storylets share a cell the lower id is
    /// reported.
    #[must_use]
    pub fn occupied_cells(&self) -> BTreeMap<Coordinate, StoryletId> {
        let mut cells = BTreeMap::new();
        for storylet in self.storylets.values() {
            if let Some(coordinate) = storylet.coordinate {
                cells.entry(coordinate).or_insert(storylet.id);
            }
        }
        cells
    }

    /// Dangling choice targets, one error per offending choice.
    #[must_use]
    pub fn integrity_errors(&self) -> Vec<ImprovementError> {
        self.edges()
            .into_iter()
            .filter(|edge| !self.contains(edge.target))
            .map(|edge| ImprovementError::GraphIntegrity {
                from: edge.from,
                target: edge.target,
            })
            .collect()
    }

    /// Destination preview computed from the target's current state.
    ///
    /// Unlike the cached [`Choice::preview`], this never goes stale when a
    /// target is renamed.
    #[must_use]
    pub fn live_preview(&self, choice: &Choice) -> Option<String> {
        choice
            .target
            .and_then(|target| self.get(target))
            .map(|target| target.place_name().to_owned())
    }

    /// Mutations that turn `baseline` into `self`.
    ///
    /// Storylets never disappear, so only creations, appended choices and
    /// in-place updates are reported. Every creation comes first, so no
    /// change points at a storylet the store has not seen yet; within each
    /// group the order is ascending id.
    #[must_use]
    pub fn changes_since(&self, baseline: &WorldGraph) -> Vec<GraphChange> {
        let mut changes: Vec<GraphChange> = self
            .storylets
            .values()
            .filter(|current| !baseline.contains(current.id))
            .cloned()
            .map(GraphChange::Created)
            .collect();

        for (id, current) in &self.storylets {
            let Some(before) = baseline.get(*id) else {
                continue;
            };

            let mut patch = StoryletPatch::default();
            if current.coordinate != before.coordinate {
                patch.coordinate = current.coordinate;
            }

            let kept = before.choices.len().min(current.choices.len());
            let prefix_unchanged = current.choices[..kept] == before.choices[..kept]
                && current.choices.len() >= before.choices.len();

            if prefix_unchanged {
                if !patch.is_empty() {
                    changes.push(GraphChange::Updated { id: *id, patch });
                }
                for choice in &current.choices[kept..] {
                    changes.push(GraphChange::ChoiceAdded {
                        from: *id,
                        choice: choice.clone(),
                    });
                }
            } else {
                patch.choices = Some(current.choices.clone());
                changes.push(GraphChange::Updated { id: *id, patch });
            }
        }
        changes
    }
}
