//! Storylet data model: storylets, choices and coordinates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Variable name → value map used for preconditions, effects and choice
/// conditions. Ordered so every traversal is deterministic.
pub type VariableMap = BTreeMap<String, serde_json::Value>;

/// Newtype wrapper for storylet IDs.
///
/// IDs are totally ordered; every "lowest id wins" tie-break in the engine
/// uses this ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StoryletId(pub u64);

impl fmt::Display for StoryletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A cell on the integer world grid. North is negative `y`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Coordinate {
    /// Horizontal position (east is positive).
    pub x: i32,
    /// Vertical position (south is positive).
    pub y: i32,
}

impl Coordinate {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns this coordinate shifted by `(dx, dy)`, or `None` if either
    /// component would leave the `i32` range.
    #[must_use]
    pub const fn checked_offset(self, dx: i32, dy: i32) -> Option<Self> {
        match (self.x.checked_add(dx), self.y.checked_add(dy)) {
            (Some(x), Some(y)) => Some(Self { x, y }),
            _ => None,
        }
    }

    /// Squared Euclidean distance, exact in integers for any two cells.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> i128 {
        let dx = i128::from(self.x) - i128::from(other.x);
        let dy = i128::from(self.y) - i128::from(other.y);
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distance(self, other: Self) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }

    /// Grid midpoint between two coordinates, rounding toward negative
    /// infinity on both axes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn midpoint(self, other: Self) -> Self {
        let x = (i64::from(self.x) + i64::from(other.x)).div_euclid(2);
        let y = (i64::from(self.y) + i64::from(other.y)).div_euclid(2);
        Self {
            x: x as i32,
            y: y as i32,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A player-facing, optionally guarded edge from one storylet to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Display text shown to the player.
    pub text: String,
    /// Destination storylet, or `None` for a terminal choice.
    #[serde(default)]
    pub target: Option<StoryletId>,
    /// Variables that must hold for the choice to be offered.
    #[serde(default, skip_serializing_if = "VariableMap::is_empty")]
    pub condition: VariableMap,
    /// Suppresses the automatic return path for this edge.
    #[serde(default)]
    pub no_return: bool,
    /// Cached destination preview, filled by the deepening pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Set on edges created by the engine.
    #[serde(default)]
    pub synthesized: bool,
}

impl Choice {
    /// Creates an unguarded authored choice leading to `target`.
    #[must_use]
    pub fn to(text: impl Into<String>, target: StoryletId) -> Self {
        Self {
            text: text.into(),
            target: Some(target),
            condition: VariableMap::new(),
            no_return: false,
            preview: None,
            synthesized: false,
        }
    }

    /// Creates a terminal choice that ends the thread.
    #[must_use]
    pub fn terminal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: None,
            condition: VariableMap::new(),
            no_return: false,
            preview: None,
            synthesized: false,
        }
    }

    /// Creates an engine-synthesized choice leading to `target`.
    #[must_use]
    pub fn synthesized(text: impl Into<String>, target: StoryletId) -> Self {
        Self {
            synthesized: true,
            ..Self::to(text, target)
        }
    }

    /// Marks this edge as one-way.
    #[must_use]
    pub fn one_way(mut self) -> Self {
        self.no_return = true;
        self
    }

    /// Adds a condition on `variable`.
    #[must_use]
    pub fn when(mut self, variable: impl Into<String>, value: serde_json::Value) -> Self {
        self.condition.insert(variable.into(), value);
        self
    }

    /// Text with the cached destination preview appended, if any.
    #[must_use]
    pub fn display_label(&self) -> String {
        match &self.preview {
            Some(preview) => format!("{} (→ {preview})", self.text),
            None => self.text.clone(),
        }
    }
}

/// An atomic narrative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storylet {
    /// Unique identifier.
    pub id: StoryletId,
    /// Short title.
    pub title: String,
    /// Narrative text.
    #[serde(default)]
    pub text: String,
    /// Free-text location name.
    #[serde(default)]
    pub location: String,
    /// Grid position, absent until assigned.
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    /// Outbound choices, in display order.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Variables the storylet requires.
    #[serde(default)]
    pub requires: VariableMap,
    /// Variables the storylet assigns.
    #[serde(default)]
    pub effects: VariableMap,
    /// Set on storylets created by the engine.
    #[serde(default)]
    pub synthesized: bool,
}

impl Storylet {
    /// Creates an authored storylet with no choices and no coordinate.
    #[must_use]
    pub fn new(id: StoryletId, title: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            text: String::new(),
            location: location.into(),
            coordinate: None,
            choices: Vec::new(),
            requires: VariableMap::new(),
            effects: VariableMap::new(),
            synthesized: false,
        }
    }

    /// Targets of choices that lead somewhere other than this storylet.
    pub fn outbound_targets(&self) -> impl Iterator<Item = StoryletId> + '_ {
        self.choices
            .iter()
            .filter_map(|choice| choice.target)
            .filter(move |target| *target != self.id)
    }

    /// Returns true if any choice leads to `target`.
    #[must_use]
    pub fn leads_to(&self, target: StoryletId) -> bool {
        self.choices.iter().any(|c| c.target == Some(target))
    }

    /// Returns true if at least one choice ends the thread.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.choices.iter().any(|c| c.target.is_none())
    }

    /// The location name, or the title when the location is blank.
    #[must_use]
    pub fn place_name(&self) -> &str {
        if self.location.trim().is_empty() {
            &self.title
        } else {
            &self.location
        }
    }
}
