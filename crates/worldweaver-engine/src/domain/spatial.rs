//! Spatial navigation: coordinate assignment and grid queries.
//!
//! Every storylet gets a cell on an integer grid derived from its location
//! name. Collisions are resolved by scanning outward in square rings around
//! the preferred cell, in a fixed order, up to a bounded radius.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use worldweaver_core::error::ImprovementError;
use worldweaver_core::graph::WorldGraph;
use worldweaver_core::storylet::{Coordinate, StoryletId, VariableMap};

use super::location::LocationMapper;

/// Default bound on the collision search radius.
pub const DEFAULT_MAX_SEARCH_RADIUS: u32 = 20;

/// Largest grid, in cells, that [`render_map`] draws.
pub const MAX_RENDER_CELLS: u64 = 16_384;

/// Which storylets a coordinate assignment run considers.
#[derive(Debug, Clone, Copy)]
pub enum AssignScope<'a> {
    /// Every storylet in the graph.
    All,
    /// Only the listed storylets.
    Only(&'a [StoryletId]),
}

/// Result of one assignment run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssignOutcome {
    /// Storylets that received a coordinate, in processing order.
    pub assigned: Vec<StoryletId>,
    /// Per-storylet failures; the rest of the run still completed.
    pub errors: Vec<ImprovementError>,
}

impl AssignOutcome {
    /// Number of storylets updated.
    #[must_use]
    pub fn count(&self) -> usize {
        self.assigned.len()
    }
}

/// One of the eight compass directions. North is negative `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl Direction {
    /// All directions, clockwise from north.
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::Northeast,
        Self::East,
        Self::Southeast,
        Self::South,
        Self::Southwest,
        Self::West,
        Self::Northwest,
    ];

    /// Grid step for one move in this direction.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::Northeast => (1, -1),
            Self::East => (1, 0),
            Self::Southeast => (1, 1),
            Self::South => (0, 1),
            Self::Southwest => (-1, 1),
            Self::West => (-1, 0),
            Self::Northwest => (-1, -1),
        }
    }

    /// Arrow glyph for map displays.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::North => '↑',
            Self::Northeast => '↗',
            Self::East => '→',
            Self::Southeast => '↘',
            Self::South => '↓',
            Self::Southwest => '↙',
            Self::West => '←',
            Self::Northwest => '↖',
        }
    }

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::Northeast => "northeast",
            Self::East => "east",
            Self::Southeast => "southeast",
            Self::South => "south",
            Self::Southwest => "southwest",
            Self::West => "west",
            Self::Northwest => "northwest",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storylet adjacent to another on the grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbour {
    /// The adjacent storylet.
    pub id: StoryletId,
    /// Its title.
    pub title: String,
    /// Its cell.
    pub coordinate: Coordinate,
    /// Arrow glyph of the direction taken.
    pub symbol: char,
    /// Preconditions for entering it.
    pub requires: VariableMap,
}

/// Smallest rectangle containing every placed storylet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl MapBounds {
    /// Columns and rows covered, inclusive of both edges.
    #[must_use]
    pub fn extent(self) -> (u64, u64) {
        let span = |min: i32, max: i32| (i64::from(max) - i64::from(min)).unsigned_abs() + 1;
        (span(self.min_x, self.max_x), span(self.min_y, self.max_y))
    }
}

/// Assigns coordinates and answers grid questions.
#[derive(Debug, Clone, Copy)]
pub struct SpatialNavigator<'m> {
    mapper: &'m LocationMapper,
    max_search_radius: u32,
}

impl<'m> SpatialNavigator<'m> {
    /// Creates a navigator with the given collision search bound.
    #[must_use]
    pub fn new(mapper: &'m LocationMapper, max_search_radius: u32) -> Self {
        Self {
            mapper,
            max_search_radius,
        }
    }

    /// The location mapper backing this navigator.
    #[must_use]
    pub fn mapper(&self) -> &'m LocationMapper {
        self.mapper
    }

    /// The collision search bound.
    #[must_use]
    pub fn max_search_radius(&self) -> u32 {
        self.max_search_radius
    }

    /// Gives every in-scope storylet that lacks a coordinate a free cell.
    ///
    /// Storylets are processed in ascending id order and an existing
    /// coordinate is never overwritten, so a second call changes nothing.
    /// Unknown ids and exhausted searches are recorded per storylet.
    pub fn auto_assign_coordinates(
        &self,
        graph: &mut WorldGraph,
        scope: AssignScope<'_>,
    ) -> AssignOutcome {
        let mut outcome = AssignOutcome::default();

        let targets: Vec<StoryletId> = match scope {
            AssignScope::All => graph.ids(),
            AssignScope::Only(ids) => {
                let mut ids = ids.to_vec();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        };

        let mut occupied = graph.occupied_cells();
        for id in targets {
            let Some(storylet) = graph.get(id) else {
                outcome.errors.push(ImprovementError::UnknownStorylet(id));
                continue;
            };
            if storylet.coordinate.is_some() {
                continue;
            }

            let preferred = self.mapper.map(&storylet.location);
            match self.free_cell(&occupied, preferred, id) {
                Ok(cell) => {
                    debug!(storylet_id = %id, %preferred, %cell, "assigned coordinate");
                    occupied.insert(cell, id);
                    if let Some(storylet) = graph.get_mut(id) {
                        storylet.coordinate = Some(cell);
                    }
                    outcome.assigned.push(id);
                }
                Err(error) => outcome.errors.push(error),
            }
        }

        outcome
    }

    /// Bulk fix: assigns coordinates across the whole graph.
    pub fn ensure_all_coordinates(&self, graph: &mut WorldGraph) -> AssignOutcome {
        self.auto_assign_coordinates(graph, AssignScope::All)
    }

    /// Nearest free cell to `preferred` given the graph's current layout.
    ///
    /// # Errors
    ///
    /// Returns `ImprovementError::Placement` if every cell within the
    /// search radius is taken.
    pub fn place_near(
        &self,
        graph: &WorldGraph,
        preferred: Coordinate,
        for_id: StoryletId,
    ) -> Result<Coordinate, ImprovementError> {
        self.free_cell(&graph.occupied_cells(), preferred, for_id)
    }

    fn free_cell(
        &self,
        occupied: &BTreeMap<Coordinate, StoryletId>,
        preferred: Coordinate,
        for_id: StoryletId,
    ) -> Result<Coordinate, ImprovementError> {
        if !occupied.contains_key(&preferred) {
            return Ok(preferred);
        }
        (1..=self.max_search_radius)
            .flat_map(ring_offsets)
            .filter_map(|(dx, dy)| preferred.checked_offset(dx, dy))
            .find(|cell| !occupied.contains_key(cell))
            .ok_or(ImprovementError::Placement {
                storylet_id: for_id,
                origin: preferred,
                radius: self.max_search_radius,
            })
    }

    /// Storylets in the eight cells around `id`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStorylet` for a missing id and `Unplaced` if the
    /// storylet has no coordinate.
    pub fn directional_navigation(
        graph: &WorldGraph,
        id: StoryletId,
    ) -> Result<BTreeMap<Direction, Option<Neighbour>>, ImprovementError> {
        let storylet = graph
            .get(id)
            .ok_or(ImprovementError::UnknownStorylet(id))?;
        let origin = storylet
            .coordinate
            .ok_or(ImprovementError::Unplaced(id))?;
        let cells = graph.occupied_cells();

        Ok(Direction::ALL
            .into_iter()
            .map(|direction| {
                let (dx, dy) = direction.delta();
                // Cells past the edge of the grid are never occupied.
                let neighbour = origin.checked_offset(dx, dy).and_then(|coordinate| {
                    let neighbour = graph.get(*cells.get(&coordinate)?)?;
                    Some(Neighbour {
                        id: neighbour.id,
                        title: neighbour.title.clone(),
                        coordinate,
                        symbol: direction.symbol(),
                        requires: neighbour.requires.clone(),
                    })
                });
                (direction, neighbour)
            })
            .collect())
    }

    /// Returns true if a storylet lies in `direction` from `id` and the
    /// player's variables satisfy its preconditions.
    ///
    /// # Errors
    ///
    /// Same as [`Self::directional_navigation`].
    pub fn can_move(
        graph: &WorldGraph,
        id: StoryletId,
        direction: Direction,
        player_vars: &VariableMap,
    ) -> Result<bool, ImprovementError> {
        let mut navigation = Self::directional_navigation(graph, id)?;
        Ok(navigation
            .remove(&direction)
            .flatten()
            .is_some_and(|target| requirements_met(&target.requires, player_vars)))
    }
}

/// Bounds of every placed storylet; all zeros for an unplaced graph.
#[must_use]
pub fn map_bounds(graph: &WorldGraph) -> MapBounds {
    let mut cells = graph.storylets().filter_map(|s| s.coordinate);
    let Some(first) = cells.next() else {
        return MapBounds::default();
    };
    cells.fold(
        MapBounds {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        },
        |b, c| MapBounds {
            min_x: b.min_x.min(c.x),
            max_x: b.max_x.max(c.x),
            min_y: b.min_y.min(c.y),
            max_y: b.max_y.max(c.y),
        },
    )
}

/// Renders placed storylets as a text grid, north at the top. Empty cells
/// show `.`; occupied cells show the lowest id in the cell.
///
/// A layout spanning more than [`MAX_RENDER_CELLS`] cells is summarised in
/// one line instead of drawn.
#[must_use]
pub fn render_map(graph: &WorldGraph) -> String {
    let cells = graph.occupied_cells();
    if cells.is_empty() {
        return String::new();
    }
    let bounds = map_bounds(graph);
    let (columns, rows) = bounds.extent();
    if u128::from(columns) * u128::from(rows) > u128::from(MAX_RENDER_CELLS) {
        return format!(
            "map spans {columns}x{rows} cells, over the {MAX_RENDER_CELLS} cell render limit\n"
        );
    }
    let width = cells
        .values()
        .map(|id| id.0.to_string().len())
        .max()
        .unwrap_or(1);

    let mut out = String::new();
    for y in bounds.min_y..=bounds.max_y {
        let row: Vec<String> = (bounds.min_x..=bounds.max_x)
            .map(|x| match cells.get(&Coordinate::new(x, y)) {
                Some(id) => format!("{:>width$}", id.0),
                None => format!("{:>width$}", "."),
            })
            .collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

/// Cells at Chebyshev distance `radius`, nearest first; equal distances
/// prefer the larger x offset, then the larger y offset.
#[allow(clippy::cast_possible_wrap)]
fn ring_offsets(radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i32;
    let mut ring: Vec<(i32, i32)> = (-r..=r)
        .flat_map(|dx| (-r..=r).map(move |dy| (dx, dy)))
        .filter(|&(dx, dy)| dx.abs().max(dy.abs()) == r)
        .collect();
    ring.sort_by_key(|&(dx, dy)| (dx * dx + dy * dy, Reverse(dx), Reverse(dy)));
    ring
}

/// Checks preconditions against player variables. Object values hold
/// comparison operators (`gte`, `lte`, `gt`, `lt`); anything else must
/// match exactly.
fn requirements_met(requires: &VariableMap, player_vars: &VariableMap) -> bool {
    requires.iter().all(|(key, required)| {
        let Some(actual) = player_vars.get(key) else {
            return false;
        };
        match required {
            Value::Object(ops) => ops.iter().all(|(op, bound)| {
                let (Some(actual), Some(bound)) = (actual.as_f64(), bound.as_f64()) else {
                    return false;
                };
                match op.as_str() {
                    "gte" => actual >= bound,
                    "lte" => actual <= bound,
                    "gt" => actual > bound,
                    "lt" => actual < bound,
                    _ => true,
                }
            }),
            _ => actual == required,
        }
    })
}
