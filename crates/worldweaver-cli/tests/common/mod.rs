//! Shared helpers for CLI integration tests.
#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use worldweaver_core::storylet::Storylet;
use worldweaver_test_support::{FixedClock, StoryletBuilder, fixed_now};

/// Writes `storylets` as a world file inside a fresh temporary directory.
///
/// The directory is returned so it outlives the test body.
pub fn write_world(storylets: Vec<Storylet>) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.json");
    std::fs::write(&path, serde_json::to_string_pretty(&storylets).unwrap()).unwrap();
    (dir, path)
}

/// Reads the world file back.
pub fn read_world(path: &PathBuf) -> Vec<Storylet> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Forest edge placed west of the origin, plus an unplaced, unconnected
/// clearing.
pub fn forest() -> Vec<Storylet> {
    vec![
        StoryletBuilder::new(1, "Forest Edge").at(-3, 0).build(),
        StoryletBuilder::new(2, "Dark Forest Clearing").build(),
    ]
}

/// Deterministic clock for runs.
pub fn clock() -> FixedClock {
    FixedClock(fixed_now())
}

/// Turns literal arguments into owned strings, prefixed by the world path.
pub fn args(path: &PathBuf, rest: &[&str]) -> Vec<String> {
    std::iter::once(path.display().to_string())
        .chain(rest.iter().map(|s| (*s).to_owned()))
        .collect()
}
