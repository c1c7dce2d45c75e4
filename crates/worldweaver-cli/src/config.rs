//! Process configuration read from the environment.

use std::path::PathBuf;

use worldweaver_engine::application::command_handlers::ImprovementEngine;
use worldweaver_engine::domain::config::EngineConfig;
use worldweaver_engine::domain::location::KeywordTable;

use crate::error::AppError;

/// Environment variable naming an optional YAML keyword table.
pub const KEYWORDS_VAR: &str = "WORLDWEAVER_KEYWORDS";

/// Environment variable overriding the per-pass synthesis cap.
pub const MAX_NODES_VAR: &str = "WORLDWEAVER_MAX_NODES";

/// Settings that shape the engine for this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// YAML keyword table to load instead of the built-in one.
    pub keywords_path: Option<PathBuf>,
    /// Override for the synthesis cap.
    pub max_synthesized_nodes: Option<usize>,
}

impl CliConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's
    /// value if it is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `WORLDWEAVER_MAX_NODES` is not a
    /// non-negative integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let keywords_path = lookup(KEYWORDS_VAR)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let max_synthesized_nodes = lookup(MAX_NODES_VAR)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|e| AppError::Config(format!("{MAX_NODES_VAR} must be a valid usize: {e}")))
            })
            .transpose()?;
        Ok(Self {
            keywords_path,
            max_synthesized_nodes,
        })
    }

    /// Builds the engine, loading the keyword table once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Engine` wrapping a configuration error if the
    /// keyword table cannot be loaded.
    pub fn engine(&self) -> Result<ImprovementEngine, AppError> {
        let table = match &self.keywords_path {
            Some(path) => KeywordTable::load_from_yaml(path)?,
            None => KeywordTable::builtin(),
        };
        let mut config = EngineConfig::default();
        if let Some(limit) = self.max_synthesized_nodes {
            config.max_synthesized_nodes = limit;
        }
        tracing::info!(
            keyword_table = table.version(),
            keyword_fingerprint = table.fingerprint(),
            max_synthesized_nodes = config.max_synthesized_nodes,
            "engine configured"
        );
        Ok(ImprovementEngine::new(table, config))
    }
}
