//! A `StoryletStore` backed by a JSON file.
//!
//! The file holds a JSON array of storylets. Writes are staged in memory
//! and only reach the file on `commit`, which writes a sibling temporary
//! file and renames it over the original.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use worldweaver_core::error::ImprovementError;
use worldweaver_core::graph::StoryletPatch;
use worldweaver_core::store::StoryletStore;
use worldweaver_core::storylet::{Choice, Storylet, StoryletId};

use crate::error::AppError;

type Storylets = BTreeMap<StoryletId, Storylet>;

/// File-backed storylet store with staged writes.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    committed: Mutex<Storylets>,
    staged: Mutex<Storylets>,
}

impl JsonFileStore {
    /// Opens the world file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be read,
    /// `AppError::Json` if it is not a storylet list and `AppError::Config`
    /// if two storylets share an id.
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let storylets: Vec<Storylet> = serde_json::from_str(&contents)?;
        let mut map = Storylets::new();
        for storylet in storylets {
            let id = storylet.id;
            if map.insert(id, storylet).is_some() {
                return Err(AppError::Config(format!(
                    "{} lists storylet {id} more than once",
                    path.display()
                )));
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            committed: Mutex::new(map.clone()),
            staged: Mutex::new(map),
        })
    }

    /// The world file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staged(&self) -> Result<MutexGuard<'_, Storylets>, ImprovementError> {
        self.staged
            .lock()
            .map_err(|_| ImprovementError::Store("staged state lock poisoned".to_owned()))
    }

    fn committed(&self) -> Result<MutexGuard<'_, Storylets>, ImprovementError> {
        self.committed
            .lock()
            .map_err(|_| ImprovementError::Store("committed state lock poisoned".to_owned()))
    }
}

fn store_error(context: &str, error: impl std::fmt::Display) -> ImprovementError {
    ImprovementError::Store(format!("{context}: {error}"))
}

#[async_trait]
impl StoryletStore for JsonFileStore {
    async fn get(&self, id: StoryletId) -> Result<Option<Storylet>, ImprovementError> {
        Ok(self.staged()?.get(&id).cloned())
    }

    async fn list(&self, ids: Option<&[StoryletId]>) -> Result<Vec<Storylet>, ImprovementError> {
        let staged = self.staged()?;
        Ok(match ids {
            Some(ids) => ids.iter().filter_map(|id| staged.get(id).cloned()).collect(),
            None => staged.values().cloned().collect(),
        })
    }

    async fn create(&self, storylet: Storylet) -> Result<StoryletId, ImprovementError> {
        let mut staged = self.staged()?;
        if staged.contains_key(&storylet.id) {
            return Err(ImprovementError::Store(format!(
                "storylet {} already exists",
                storylet.id
            )));
        }
        let id = storylet.id;
        staged.insert(id, storylet);
        Ok(id)
    }

    async fn add_choice(&self, from: StoryletId, choice: Choice) -> Result<(), ImprovementError> {
        self.staged()?
            .get_mut(&from)
            .ok_or_else(|| ImprovementError::Store(format!("no storylet {from}")))?
            .choices
            .push(choice);
        Ok(())
    }

    async fn update(&self, id: StoryletId, patch: StoryletPatch) -> Result<(), ImprovementError> {
        let mut staged = self.staged()?;
        let storylet = staged
            .get_mut(&id)
            .ok_or_else(|| ImprovementError::Store(format!("no storylet {id}")))?;
        if let Some(coordinate) = patch.coordinate {
            storylet.coordinate = Some(coordinate);
        }
        if let Some(choices) = patch.choices {
            storylet.choices = choices;
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), ImprovementError> {
        let snapshot = self.staged()?.clone();
        let storylets: Vec<&Storylet> = snapshot.values().collect();
        let json = serde_json::to_string_pretty(&storylets)
            .map_err(|e| store_error("cannot encode world", e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| store_error("cannot write world", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| store_error("cannot replace world", e))?;

        *self.committed()? = snapshot;
        tracing::debug!(path = %self.path.display(), "world file committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), ImprovementError> {
        let committed = self.committed()?.clone();
        *self.staged()? = committed;
        Ok(())
    }
}
