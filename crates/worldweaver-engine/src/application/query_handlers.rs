//! Query handlers for the consistency engine.
//!
//! These load the world from the storylet store and return read-only view
//! DTOs. They never mutate the graph.

use std::collections::BTreeMap;

use serde::Serialize;
use worldweaver_core::error::ImprovementError;
use worldweaver_core::store::{StoryletStore, load_world};
use worldweaver_core::storylet::{Coordinate, StoryletId, VariableMap};

use crate::domain::analysis::GraphAnalysis;
use crate::domain::spatial::{self, Direction, MapBounds, Neighbour, SpatialNavigator};

/// A placed storylet on the spatial map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedStoryletView {
    /// The storylet identifier.
    pub id: StoryletId,
    /// Its title.
    pub title: String,
    /// Its cell.
    pub coordinate: Coordinate,
    /// Preconditions for entering it.
    pub requires: VariableMap,
}

/// Read-only view of the world's spatial layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialMapView {
    /// Placed storylets in id order.
    pub storylets: Vec<PlacedStoryletView>,
    /// Smallest rectangle containing them.
    pub bounds: MapBounds,
    /// Text rendering, north at the top, or a one-line summary when the
    /// layout is too large to draw.
    pub rendered: String,
}

/// Read-only view of the moves available from one storylet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionalView {
    /// The storylet moved from.
    pub storylet_id: StoryletId,
    /// Neighbour in each of the eight directions, if any.
    pub exits: BTreeMap<Direction, Option<Neighbour>>,
}

/// Runs gap analysis over the stored world.
///
/// # Errors
///
/// Returns `ImprovementError::Store` if the store cannot be read and
/// `ImprovementError::DuplicateStorylet` if it lists an id twice.
pub async fn analyze_world(store: &dyn StoryletStore) -> Result<GraphAnalysis, ImprovementError> {
    let (graph, _) = load_world(store).await?;
    Ok(GraphAnalysis::of(&graph))
}

/// Returns the stored world's spatial map.
///
/// # Errors
///
/// Returns `ImprovementError::Store` if the store cannot be read and
/// `ImprovementError::DuplicateStorylet` if it lists an id twice.
pub async fn spatial_map(store: &dyn StoryletStore) -> Result<SpatialMapView, ImprovementError> {
    let (graph, _) = load_world(store).await?;
    let storylets = graph
        .storylets()
        .filter_map(|s| {
            s.coordinate.map(|coordinate| PlacedStoryletView {
                id: s.id,
                title: s.title.clone(),
                coordinate,
                requires: s.requires.clone(),
            })
        })
        .collect();
    Ok(SpatialMapView {
        storylets,
        bounds: spatial::map_bounds(&graph),
        rendered: spatial::render_map(&graph),
    })
}

/// Returns the storylets adjacent to `storylet_id` on the grid.
///
/// # Errors
///
/// Returns `ImprovementError::Store` if the store cannot be read,
/// `ImprovementError::UnknownStorylet` if the storylet does not exist and
/// `ImprovementError::Unplaced` if it has no coordinate.
pub async fn directional_navigation(
    storylet_id: StoryletId,
    store: &dyn StoryletStore,
) -> Result<DirectionalView, ImprovementError> {
    let (graph, _) = load_world(store).await?;
    let exits = SpatialNavigator::directional_navigation(&graph, storylet_id)?;
    Ok(DirectionalView { storylet_id, exits })
}
