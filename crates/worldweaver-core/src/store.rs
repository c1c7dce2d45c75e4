//! Storylet store abstraction.

use async_trait::async_trait;

use crate::error::ImprovementError;
use crate::graph::{GraphChange, StoryletPatch, WorldGraph};
use crate::storylet::{Choice, Storylet, StoryletId};

/// Persistence collaborator for storylets.
///
/// Writes are staged until `commit`; `rollback` discards everything staged
/// since the last commit. All failures are reported as
/// `ImprovementError::Store`.
#[async_trait]
pub trait StoryletStore: Send + Sync {
    /// Loads one storylet.
    async fn get(&self, id: StoryletId) -> Result<Option<Storylet>, ImprovementError>;

    /// Loads the given storylets, or every storylet when `ids` is `None`.
    async fn list(&self, ids: Option<&[StoryletId]>) -> Result<Vec<Storylet>, ImprovementError>;

    /// Stages a new storylet and returns the id it was stored under.
    async fn create(&self, storylet: Storylet) -> Result<StoryletId, ImprovementError>;

    /// Stages a choice appended to `from`.
    async fn add_choice(&self, from: StoryletId, choice: Choice) -> Result<(), ImprovementError>;

    /// Stages an in-place update.
    async fn update(&self, id: StoryletId, patch: StoryletPatch) -> Result<(), ImprovementError>;

    /// Makes all staged writes durable.
    async fn commit(&self) -> Result<(), ImprovementError>;

    /// Discards all staged writes.
    async fn rollback(&self) -> Result<(), ImprovementError>;
}

/// Builds a graph from every storylet in the store.
///
/// Dangling choice targets are returned alongside the graph rather than
/// failing the load.
///
/// # Errors
///
/// Returns `ImprovementError::Store` if the store cannot be read and
/// `ImprovementError::DuplicateStorylet` if it lists an id twice.
pub async fn load_world(
    store: &dyn StoryletStore,
) -> Result<(WorldGraph, Vec<ImprovementError>), ImprovementError> {
    let graph = WorldGraph::try_from(store.list(None).await?)?;
    let integrity = graph.integrity_errors();
    Ok((graph, integrity))
}

/// Stages `changes` in the store, in order.
///
/// # Errors
///
/// Returns the first store failure. A created storylet stored under an id
/// other than the one the graph allocated is reported as
/// `ImprovementError::Store`, since later changes refer to that id.
pub async fn apply_changes(
    store: &dyn StoryletStore,
    changes: Vec<GraphChange>,
) -> Result<(), ImprovementError> {
    for change in changes {
        match change {
            GraphChange::Created(storylet) => {
                let expected = storylet.id;
                let stored = store.create(storylet).await?;
                if stored != expected {
                    return Err(ImprovementError::Store(format!(
                        "storylet {expected} was stored as {stored}"
                    )));
                }
            }
            GraphChange::ChoiceAdded { from, choice } => store.add_choice(from, choice).await?,
            GraphChange::Updated { id, patch } => store.update(id, patch).await?,
        }
    }
    Ok(())
}
