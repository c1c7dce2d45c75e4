//! Engine configuration with documented defaults.

use chrono::TimeDelta;

use super::deepener::DeepenerConfig;
use super::spatial::DEFAULT_MAX_SEARCH_RADIUS;

/// Default cap on storylets synthesized in one pass.
pub const DEFAULT_MAX_SYNTHESIZED_NODES: usize = 64;

/// Default wall-clock budget for one pass, in seconds.
pub const DEFAULT_WALL_CLOCK_SECONDS: i64 = 5;

/// Limits and thresholds for improvement passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Collision search bound for coordinate placement.
    pub max_search_radius: u32,
    /// Storylets one pass may synthesize before it stops early.
    pub max_synthesized_nodes: usize,
    /// Time one pass may spend before it stops early.
    pub wall_clock_budget: TimeDelta,
    /// Deepening thresholds.
    pub deepener: DeepenerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_search_radius: DEFAULT_MAX_SEARCH_RADIUS,
            max_synthesized_nodes: DEFAULT_MAX_SYNTHESIZED_NODES,
            wall_clock_budget: TimeDelta::seconds(DEFAULT_WALL_CLOCK_SECONDS),
            deepener: DeepenerConfig::default(),
        }
    }
}
