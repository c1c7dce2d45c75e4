//! Storylet fixtures for building small test worlds.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use worldweaver_core::graph::WorldGraph;
use worldweaver_core::storylet::{Choice, Coordinate, Storylet, StoryletId};

/// Fixed timestamp used across tests.
///
/// # Panics
///
/// Panics only if chrono rejects the hard-coded date.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Builds a graph from storylet builders.
#[must_use]
pub fn graph_of(storylets: impl IntoIterator<Item = StoryletBuilder>) -> WorldGraph {
    storylets.into_iter().map(StoryletBuilder::build).collect()
}

/// Fluent builder for test storylets.
#[derive(Debug, Clone)]
pub struct StoryletBuilder {
    storylet: Storylet,
}

impl StoryletBuilder {
    /// Starts a storylet with the given id and location; the title is
    /// derived from the id.
    #[must_use]
    pub fn new(id: u64, location: &str) -> Self {
        Self {
            storylet: Storylet::new(StoryletId(id), format!("Storylet {id}"), location),
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        self.storylet.title = title.to_owned();
        self
    }

    /// Sets the narrative text.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.storylet.text = text.to_owned();
        self
    }

    /// Places the storylet.
    #[must_use]
    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.storylet.coordinate = Some(Coordinate::new(x, y));
        self
    }

    /// Adds a choice to `target`.
    #[must_use]
    pub fn choice_to(mut self, target: u64) -> Self {
        self.storylet
            .choices
            .push(Choice::to(format!("Go to {target}"), StoryletId(target)));
        self
    }

    /// Adds a one-way choice to `target`.
    #[must_use]
    pub fn one_way_to(mut self, target: u64) -> Self {
        self.storylet
            .choices
            .push(Choice::to(format!("Leave for {target}"), StoryletId(target)).one_way());
        self
    }

    /// Adds an arbitrary choice.
    #[must_use]
    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.storylet.choices.push(choice);
        self
    }

    /// Adds a precondition.
    #[must_use]
    pub fn requires(mut self, variable: &str, value: Value) -> Self {
        self.storylet.requires.insert(variable.to_owned(), value);
        self
    }

    /// Adds an effect.
    #[must_use]
    pub fn sets(mut self, variable: &str, value: Value) -> Self {
        self.storylet.effects.insert(variable.to_owned(), value);
        self
    }

    /// Finishes the storylet.
    #[must_use]
    pub fn build(self) -> Storylet {
        self.storylet
    }
}
