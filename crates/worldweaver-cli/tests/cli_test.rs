//! Integration tests for the command-line runner against real world files.

mod common;

use worldweaver_cli::error::AppError;
use worldweaver_cli::{parse_args, run};
use worldweaver_core::storylet::{Coordinate, StoryletId};
use worldweaver_engine::application::command_handlers::ImprovementEngine;
use worldweaver_test_support::StoryletBuilder;

#[tokio::test]
async fn test_improve_persists_repairs_to_the_world_file() {
    // Arrange
    let (_dir, path) = common::write_world(common::forest());
    let invocation = parse_args(&common::args(&path, &["improve", "--ids", "2"])).unwrap();

    // Act
    let output = run(&invocation, &ImprovementEngine::default(), &common::clock())
        .await
        .unwrap();

    // Assert
    assert_eq!(output["success"], true);
    assert_eq!(output["storylets_processed"], 1);
    assert_eq!(output["coordinates_assigned"], 1);
    assert_eq!(output["isolated_fixed"], 1);
    assert_eq!(output["dry_run"], false);

    let saved = common::read_world(&path);
    let clearing = saved.iter().find(|s| s.id == StoryletId(2)).unwrap();
    assert_eq!(clearing.coordinate, Some(Coordinate::new(-2, 0)));
    assert!(!clearing.choices.is_empty());
    assert!(!path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_dry_run_leaves_the_world_file_untouched() {
    let (_dir, path) = common::write_world(common::forest());
    let before = std::fs::read_to_string(&path).unwrap();
    let invocation =
        parse_args(&common::args(&path, &["improve", "--ids", "2", "--dry-run"])).unwrap();

    let output = run(&invocation, &ImprovementEngine::default(), &common::clock())
        .await
        .unwrap();

    assert_eq!(output["dry_run"], true);
    assert_eq!(output["coordinates_assigned"], 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn test_fix_coordinates_places_every_storylet() {
    let (_dir, path) = common::write_world(common::forest());
    let invocation = parse_args(&common::args(&path, &["fix-coordinates"])).unwrap();

    let output = run(&invocation, &ImprovementEngine::default(), &common::clock())
        .await
        .unwrap();

    assert_eq!(output["coordinates_assigned"], 1);
    assert!(common::read_world(&path).iter().all(|s| s.coordinate.is_some()));
}

#[tokio::test]
async fn test_analyze_and_map_report_the_stored_world() {
    let (_dir, path) = common::write_world(common::forest());
    let engine = ImprovementEngine::default();

    let analysis = run(
        &parse_args(&common::args(&path, &["analyze"])).unwrap(),
        &engine,
        &common::clock(),
    )
    .await
    .unwrap();
    let map = run(
        &parse_args(&common::args(&path, &["map"])).unwrap(),
        &engine,
        &common::clock(),
    )
    .await
    .unwrap();

    assert_eq!(analysis["total_storylets"], 2);
    assert_eq!(analysis["unplaced"], serde_json::json!([2]));
    assert_eq!(map["storylets"].as_array().unwrap().len(), 1);
    assert_eq!(map["rendered"], "1\n");
}

#[tokio::test]
async fn test_navigate_from_unplaced_storylet_is_an_engine_error() {
    let (_dir, path) = common::write_world(common::forest());
    let invocation = parse_args(&common::args(&path, &["navigate", "2"])).unwrap();

    let result = run(&invocation, &ImprovementEngine::default(), &common::clock()).await;

    assert!(matches!(result, Err(AppError::Engine(_))));
}

#[tokio::test]
async fn test_missing_world_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let invocation = parse_args(&common::args(&path, &["analyze"])).unwrap();

    let result = run(&invocation, &ImprovementEngine::default(), &common::clock()).await;

    assert!(matches!(result, Err(AppError::Io(_))));
}

#[tokio::test]
async fn test_malformed_world_file_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.json");
    std::fs::write(&path, "{ not a world").unwrap();
    let invocation = parse_args(&common::args(&path, &["map"])).unwrap();

    let result = run(&invocation, &ImprovementEngine::default(), &common::clock()).await;

    assert!(matches!(result, Err(AppError::Json(_))));
}

#[tokio::test]
async fn test_world_file_with_repeated_ids_is_refused_and_left_intact() {
    // Arrange
    let mut storylets = common::forest();
    storylets.insert(1, StoryletBuilder::new(1, "Market").build());
    let (_dir, path) = common::write_world(storylets);
    let before = std::fs::read_to_string(&path).unwrap();
    let invocation = parse_args(&common::args(&path, &["improve"])).unwrap();

    // Act
    let result = run(&invocation, &ImprovementEngine::default(), &common::clock()).await;

    // Assert
    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}
