//! WorldWeaver CLI — runs one engine command against a JSON world file.
//!
//! ```text
//! worldweaver <world.json> improve [--trigger LABEL] [--ids 1,2,...] [--dry-run]
//!                          [--no-smoothing] [--no-deepening]
//! worldweaver <world.json> fix-coordinates [--dry-run]
//! worldweaver <world.json> analyze
//! worldweaver <world.json> map
//! worldweaver <world.json> navigate <storylet-id>
//! ```
//!
//! Every command prints a single JSON document on stdout.

pub mod config;
pub mod error;
pub mod file_store;

use std::path::PathBuf;

use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;
use worldweaver_core::clock::Clock;
use worldweaver_core::report::Trigger;
use worldweaver_core::store::load_world;
use worldweaver_core::storylet::StoryletId;
use worldweaver_engine::application::command_handlers::{
    ImprovementEngine, handle_auto_improve, handle_fix_coordinates,
};
use worldweaver_engine::application::query_handlers;
use worldweaver_engine::domain::commands::{AutoImprove, FixCoordinates, ImprovementOptions};

use crate::error::AppError;
use crate::file_store::JsonFileStore;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The world file to operate on.
    pub world: PathBuf,
    /// What to do with it.
    pub command: CliCommand,
}

/// Commands the runner understands.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Run an improvement pass. With no ids, every storylet counts as added.
    Improve {
        trigger: Trigger,
        ids: Option<Vec<StoryletId>>,
        options: ImprovementOptions,
    },
    /// Assign coordinates across the whole world.
    FixCoordinates { dry_run: bool },
    /// Print gap analysis.
    Analyze,
    /// Print the spatial map.
    Map,
    /// Print the neighbours of one storylet.
    Navigate(StoryletId),
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns `AppError::Config` describing the first invalid argument.
pub fn parse_args(args: &[String]) -> Result<Invocation, AppError> {
    let mut args = args.iter().map(String::as_str);
    let world = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| AppError::Config("missing world file argument".to_owned()))?;
    let name = args
        .next()
        .ok_or_else(|| AppError::Config("missing command argument".to_owned()))?;

    let command = match name {
        "improve" => {
            let mut trigger = Trigger::Manual;
            let mut ids = None;
            let mut options = ImprovementOptions::default();
            while let Some(flag) = args.next() {
                match flag {
                    "--dry-run" => options.dry_run = true,
                    "--no-smoothing" => options.run_smoothing = false,
                    "--no-deepening" => options.run_deepening = false,
                    "--trigger" => {
                        let label = args.next().ok_or_else(|| missing_value(flag))?;
                        trigger = label.parse()?;
                    }
                    "--ids" => {
                        let list = args.next().ok_or_else(|| missing_value(flag))?;
                        ids = Some(parse_ids(list)?);
                    }
                    other => return Err(unknown_flag(other)),
                }
            }
            CliCommand::Improve {
                trigger,
                ids,
                options,
            }
        }
        "fix-coordinates" => {
            let mut dry_run = false;
            for flag in args.by_ref() {
                match flag {
                    "--dry-run" => dry_run = true,
                    other => return Err(unknown_flag(other)),
                }
            }
            CliCommand::FixCoordinates { dry_run }
        }
        "analyze" => CliCommand::Analyze,
        "map" => CliCommand::Map,
        "navigate" => {
            let id = args
                .next()
                .ok_or_else(|| AppError::Config("navigate needs a storylet id".to_owned()))?;
            CliCommand::Navigate(parse_id(id)?)
        }
        other => return Err(AppError::Config(format!("unknown command '{other}'"))),
    };

    if let Some(extra) = args.next() {
        return Err(AppError::Config(format!("unexpected argument '{extra}'")));
    }
    Ok(Invocation { world, command })
}

fn missing_value(flag: &str) -> AppError {
    AppError::Config(format!("{flag} needs a value"))
}

fn unknown_flag(flag: &str) -> AppError {
    AppError::Config(format!("unknown flag '{flag}'"))
}

fn parse_id(raw: &str) -> Result<StoryletId, AppError> {
    raw.trim()
        .trim_start_matches('#')
        .parse()
        .map(StoryletId)
        .map_err(|e| AppError::Config(format!("invalid storylet id '{raw}': {e}")))
}

fn parse_ids(list: &str) -> Result<Vec<StoryletId>, AppError> {
    list.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_id)
        .collect()
}

/// Runs one invocation and returns the JSON document to print.
///
/// # Errors
///
/// Returns an error if the world file cannot be opened or a query fails.
/// Failures inside an improvement pass are reported in the returned
/// report instead.
pub async fn run(
    invocation: &Invocation,
    engine: &ImprovementEngine,
    clock: &dyn Clock,
) -> Result<Value, AppError> {
    let store = JsonFileStore::open(&invocation.world).await?;

    let output = match &invocation.command {
        CliCommand::Improve {
            trigger,
            ids,
            options,
        } => {
            let (graph, integrity) = load_world(&store).await?;
            for error in &integrity {
                tracing::warn!(%error, "world file has a dangling choice");
            }
            let command = AutoImprove {
                correlation_id: Uuid::new_v4(),
                trigger: *trigger,
                added_storylet_ids: ids.clone().unwrap_or_else(|| graph.ids()),
                options: *options,
            };
            let world = Mutex::new(graph);
            let report = handle_auto_improve(engine, &command, &world, clock, &store).await;
            tracing::info!(summary = %report.summary(), "improvement pass complete");
            serde_json::to_value(report)?
        }
        CliCommand::FixCoordinates { dry_run } => {
            let (graph, _) = load_world(&store).await?;
            let command = FixCoordinates {
                correlation_id: Uuid::new_v4(),
                dry_run: *dry_run,
            };
            let world = Mutex::new(graph);
            serde_json::to_value(handle_fix_coordinates(engine, &command, &world, &store).await)?
        }
        CliCommand::Analyze => serde_json::to_value(query_handlers::analyze_world(&store).await?)?,
        CliCommand::Map => serde_json::to_value(query_handlers::spatial_map(&store).await?)?,
        CliCommand::Navigate(id) => {
            serde_json::to_value(query_handlers::directional_navigation(*id, &store).await?)?
        }
    };
    Ok(output)
}
