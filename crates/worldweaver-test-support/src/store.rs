//! Test stores: fake `StoryletStore` implementations for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use worldweaver_core::error::ImprovementError;
use worldweaver_core::graph::StoryletPatch;
use worldweaver_core::store::StoryletStore;
use worldweaver_core::storylet::{Choice, Storylet, StoryletId};

/// A store call, recorded in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    /// `create` for the given id.
    Create(StoryletId),
    /// `add_choice` on the given storylet.
    AddChoice(StoryletId),
    /// `update` of the given storylet.
    Update(StoryletId, StoryletPatch),
    /// `commit`.
    Commit,
    /// `rollback`.
    Rollback,
}

/// An in-memory store with staged writes and a call log.
///
/// Reads see staged writes. `commit` copies the staged state into the
/// committed state; `rollback` restores the staged state from it.
#[derive(Debug)]
pub struct InMemoryStoryletStore {
    committed: Mutex<BTreeMap<StoryletId, Storylet>>,
    staged: Mutex<BTreeMap<StoryletId, Storylet>>,
    calls: Mutex<Vec<StoreCall>>,
    fail_commit: bool,
}

impl InMemoryStoryletStore {
    /// Create a store pre-populated with committed `storylets`.
    #[must_use]
    pub fn new(storylets: Vec<Storylet>) -> Self {
        let map: BTreeMap<_, _> = storylets.into_iter().map(|s| (s.id, s)).collect();
        Self {
            committed: Mutex::new(map.clone()),
            staged: Mutex::new(map),
            calls: Mutex::new(Vec::new()),
            fail_commit: false,
        }
    }

    /// Create a store whose `commit` always fails with a store error.
    #[must_use]
    pub fn failing_on_commit(storylets: Vec<Storylet>) -> Self {
        Self {
            fail_commit: true,
            ..Self::new(storylets)
        }
    }

    /// Returns a snapshot of every call made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the committed storylets in id order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn committed(&self) -> Vec<Storylet> {
        self.committed.lock().unwrap().values().cloned().collect()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StoryletStore for InMemoryStoryletStore {
    async fn get(&self, id: StoryletId) -> Result<Option<Storylet>, ImprovementError> {
        Ok(self.staged.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, ids: Option<&[StoryletId]>) -> Result<Vec<Storylet>, ImprovementError> {
        let staged = self.staged.lock().unwrap();
        Ok(match ids {
            Some(ids) => ids.iter().filter_map(|id| staged.get(id).cloned()).collect(),
            None => staged.values().cloned().collect(),
        })
    }

    async fn create(&self, mut storylet: Storylet) -> Result<StoryletId, ImprovementError> {
        let mut staged = self.staged.lock().unwrap();
        if staged.contains_key(&storylet.id) {
            let next = staged.keys().next_back().map_or(1, |id| id.0 + 1);
            storylet.id = StoryletId(next);
        }
        let id = storylet.id;
        staged.insert(id, storylet);
        drop(staged);
        self.record(StoreCall::Create(id));
        Ok(id)
    }

    async fn add_choice(&self, from: StoryletId, choice: Choice) -> Result<(), ImprovementError> {
        self.staged
            .lock()
            .unwrap()
            .get_mut(&from)
            .ok_or_else(|| ImprovementError::Store(format!("no storylet {from}")))?
            .choices
            .push(choice);
        self.record(StoreCall::AddChoice(from));
        Ok(())
    }

    async fn update(&self, id: StoryletId, patch: StoryletPatch) -> Result<(), ImprovementError> {
        {
            let mut staged = self.staged.lock().unwrap();
            let storylet = staged
                .get_mut(&id)
                .ok_or_else(|| ImprovementError::Store(format!("no storylet {id}")))?;
            if let Some(coordinate) = patch.coordinate {
                storylet.coordinate = Some(coordinate);
            }
            if let Some(choices) = patch.choices.clone() {
                storylet.choices = choices;
            }
        }
        self.record(StoreCall::Update(id, patch));
        Ok(())
    }

    async fn commit(&self) -> Result<(), ImprovementError> {
        self.record(StoreCall::Commit);
        if self.fail_commit {
            return Err(ImprovementError::Store("commit rejected".into()));
        }
        let staged = self.staged.lock().unwrap().clone();
        *self.committed.lock().unwrap() = staged;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), ImprovementError> {
        self.record(StoreCall::Rollback);
        let committed = self.committed.lock().unwrap().clone();
        *self.staged.lock().unwrap() = committed;
        Ok(())
    }
}

/// A store that always returns a store error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingStoryletStore;

#[async_trait]
impl StoryletStore for FailingStoryletStore {
    async fn get(&self, _id: StoryletId) -> Result<Option<Storylet>, ImprovementError> {
        Err(ImprovementError::Store("connection refused".into()))
    }

    async fn list(&self, _ids: Option<&[StoryletId]>) -> Result<Vec<Storylet>, ImprovementError> {
        Err(ImprovementError::Store("connection refused".into()))
    }

    async fn create(&self, _storylet: Storylet) -> Result<StoryletId, ImprovementError> {
        Err(ImprovementError::Store("connection refused".into()))
    }

    async fn add_choice(&self, _from: StoryletId, _choice: Choice) -> Result<(), ImprovementError> {
        Err(ImprovementError::Store("connection refused".into()))
    }

    async fn update(&self, _id: StoryletId, _patch: StoryletPatch) -> Result<(), ImprovementError> {
        Err(ImprovementError::Store("connection refused".into()))
    }

    async fn commit(&self) -> Result<(), ImprovementError> {
        Err(ImprovementError::Store("connection refused".into()))
    }

    async fn rollback(&self) -> Result<(), ImprovementError> {
        Ok(())
    }
}
