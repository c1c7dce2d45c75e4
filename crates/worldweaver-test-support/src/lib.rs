//! Shared test fakes and fixtures for the WorldWeaver storylet engine.

mod clock;
mod fixtures;
mod store;

pub use clock::{FixedClock, SteppingClock};
pub use fixtures::{StoryletBuilder, fixed_now, graph_of};
pub use store::{FailingStoryletStore, InMemoryStoryletStore, StoreCall};
