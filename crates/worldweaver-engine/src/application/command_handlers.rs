//! Command handlers for the consistency engine.
//!
//! [`ImprovementEngine::auto_improve`] is the pure orchestrator: it runs
//! spatial assignment, smoothing and deepening over a graph and returns the
//! aggregated report. The async handlers wrap it with exclusive access to a
//! shared world and persistence through a [`StoryletStore`].

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use worldweaver_core::clock::Clock;
use worldweaver_core::command::Command;
use worldweaver_core::error::ImprovementError;
use worldweaver_core::graph::{GraphChange, WorldGraph};
use worldweaver_core::report::ImprovementReport;
use worldweaver_core::store::{StoryletStore, apply_changes};
use worldweaver_core::storylet::StoryletId;

use crate::domain::budget::SynthesisBudget;
use crate::domain::commands::{AutoImprove, FixCoordinates};
use crate::domain::config::EngineConfig;
use crate::domain::deepener::{self, StoryDeepener};
use crate::domain::location::{KeywordTable, LocationMapper};
use crate::domain::smoother::{self, StorySmoother};
use crate::domain::spatial::{AssignScope, SpatialNavigator};

/// A world graph shared between request handlers. Improvement passes hold
/// the lock for their whole duration.
pub type SharedWorld = Arc<Mutex<WorldGraph>>;

/// Returns true when a batch is large enough to warrant a pass.
#[must_use]
pub fn should_auto_improve(added: usize) -> bool {
    added >= 1
}

/// The consistency engine: a keyword table plus pass limits.
#[derive(Debug, Clone)]
pub struct ImprovementEngine {
    mapper: LocationMapper,
    config: EngineConfig,
}

impl Default for ImprovementEngine {
    fn default() -> Self {
        Self::new(KeywordTable::builtin(), EngineConfig::default())
    }
}

impl ImprovementEngine {
    /// Creates an engine over `table`.
    #[must_use]
    pub fn new(table: KeywordTable, config: EngineConfig) -> Self {
        Self {
            mapper: LocationMapper::new(table),
            config,
        }
    }

    /// The location mapper in use.
    #[must_use]
    pub fn mapper(&self) -> &LocationMapper {
        &self.mapper
    }

    /// The pass limits in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A navigator over this engine's mapper.
    #[must_use]
    pub fn navigator(&self) -> SpatialNavigator<'_> {
        SpatialNavigator::new(&self.mapper, self.config.max_search_radius)
    }

    /// Runs one improvement pass over `graph`.
    ///
    /// Phases run in order: spatial assignment for the added storylets,
    /// smoothing, then deepening. Failures are recorded in the report and
    /// never stop the remaining phases. A dry run works on a copy and
    /// leaves `graph` untouched.
    pub fn auto_improve(
        &self,
        graph: &mut WorldGraph,
        command: &AutoImprove,
        clock: &dyn Clock,
    ) -> ImprovementReport {
        if command.options.dry_run {
            let mut scratch = graph.clone();
            return self.run_pass(&mut scratch, command, clock);
        }
        self.run_pass(graph, command, clock)
    }

    fn run_pass(
        &self,
        graph: &mut WorldGraph,
        command: &AutoImprove,
        clock: &dyn Clock,
    ) -> ImprovementReport {
        let options = command.options;
        let mut report = ImprovementReport::new(command.trigger, options.dry_run);

        if !should_auto_improve(command.added_storylet_ids.len()) {
            debug!(trigger = %command.trigger, "no storylets added; skipping improvement pass");
            return report;
        }

        let mut added: Vec<StoryletId> = command.added_storylet_ids.clone();
        added.sort_unstable();
        added.dedup();
        let (present, missing): (Vec<_>, Vec<_>) =
            added.into_iter().partition(|id| graph.contains(*id));
        report.storylets_processed = present.len();
        for id in missing {
            report.record(&ImprovementError::UnknownStorylet(id));
        }
        report.record_all(&graph.integrity_errors());

        info!(
            command_type = command.command_type(),
            trigger = %command.trigger,
            storylets = present.len(),
            keyword_table = self.mapper.table().version(),
            keyword_fingerprint = self.mapper.table().fingerprint(),
            "starting improvement pass"
        );

        let mut budget = SynthesisBudget::new(
            self.config.max_synthesized_nodes,
            self.config.wall_clock_budget,
            clock,
        );
        let navigator = self.navigator();

        let spatial = navigator.auto_assign_coordinates(graph, AssignScope::Only(&present));
        report.coordinates_assigned = spatial.count();
        report.record_all(&spatial.errors);

        if options.run_smoothing {
            if budget.deadline_passed() {
                report.record(&budget.exceeded(smoother::PHASE, vec!["smoothing skipped".to_owned()]));
            } else {
                let outcome = StorySmoother::new(navigator).smooth(graph, &mut budget);
                report.isolated_fixed = outcome.counts.isolated_fixed;
                report.return_paths_added = outcome.counts.return_paths_added;
                report.variable_storylets_created = outcome.counts.variable_storylets_created;
                report.record_all(&outcome.errors);
            }
        }

        if options.run_deepening {
            if budget.deadline_passed() {
                report.record(&budget.exceeded(deepener::PHASE, vec!["deepening skipped".to_owned()]));
            } else {
                let outcome = StoryDeepener::new(navigator, self.config.deepener)
                    .deepen(graph, &mut budget);
                report.bridges_inserted = outcome.counts.bridges_inserted;
                report.previews_updated = outcome.counts.previews_updated;
                report.record_all(&outcome.errors);
            }
        }

        report.success = report.errors.is_empty();
        for error in &report.errors {
            warn!(%error, "improvement fix skipped");
        }
        info!(
            coordinates_assigned = report.coordinates_assigned,
            isolated_fixed = report.isolated_fixed,
            return_paths_added = report.return_paths_added,
            variable_storylets_created = report.variable_storylets_created,
            bridges_inserted = report.bridges_inserted,
            previews_updated = report.previews_updated,
            synthesized = budget.used(),
            errors = report.errors.len(),
            dry_run = report.dry_run,
            "improvement pass finished"
        );
        report
    }

    /// Assigns coordinates to every unplaced storylet in the graph.
    pub fn fix_coordinates(&self, graph: &mut WorldGraph, command: &FixCoordinates) -> ImprovementReport {
        let mut report = ImprovementReport::new(command.trigger(), command.dry_run);
        let mut scratch;
        let target = if command.dry_run {
            scratch = graph.clone();
            &mut scratch
        } else {
            graph
        };

        report.storylets_processed = target.len();
        let outcome = self.navigator().ensure_all_coordinates(target);
        report.coordinates_assigned = outcome.count();
        report.record_all(&outcome.errors);
        report.success = report.errors.is_empty();

        info!(
            command_type = command.command_type(),
            coordinates_assigned = report.coordinates_assigned,
            errors = report.errors.len(),
            dry_run = command.dry_run,
            "coordinate fix finished"
        );
        report
    }
}

/// Handles the `AutoImprove` command against a shared world.
///
/// Holds the world lock for the whole pass. A committed pass writes its
/// changes through `store` and commits before replacing the shared graph.
/// If the store fails, the store is rolled back, the shared graph is left
/// as it was and the failure is recorded in the report. Dry runs never
/// touch the store.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id,
        trigger = %command.trigger,
        dry_run = command.options.dry_run
    )
)]
pub async fn handle_auto_improve(
    engine: &ImprovementEngine,
    command: &AutoImprove,
    world: &Mutex<WorldGraph>,
    clock: &dyn Clock,
    store: &dyn StoryletStore,
) -> ImprovementReport {
    let mut shared = world.lock().await;
    if command.options.dry_run {
        return engine.auto_improve(&mut shared, command, clock);
    }

    let mut working = shared.clone();
    let mut report = engine.auto_improve(&mut working, command, clock);
    if commit_pass(store, &shared, &working, &mut report).await {
        *shared = working;
    }
    report
}

/// Handles the `FixCoordinates` command against a shared world.
#[instrument(
    skip_all,
    fields(correlation_id = %command.correlation_id, dry_run = command.dry_run)
)]
pub async fn handle_fix_coordinates(
    engine: &ImprovementEngine,
    command: &FixCoordinates,
    world: &Mutex<WorldGraph>,
    store: &dyn StoryletStore,
) -> ImprovementReport {
    let mut shared = world.lock().await;
    if command.dry_run {
        return engine.fix_coordinates(&mut shared, command);
    }

    let mut working = shared.clone();
    let mut report = engine.fix_coordinates(&mut working, command);
    if commit_pass(store, &shared, &working, &mut report).await {
        *shared = working;
    }
    report
}

/// Persists the difference between `baseline` and `working`. Returns true
/// if the store committed it.
async fn commit_pass(
    store: &dyn StoryletStore,
    baseline: &WorldGraph,
    working: &WorldGraph,
    report: &mut ImprovementReport,
) -> bool {
    let changes = working.changes_since(baseline);
    if changes.is_empty() {
        return true;
    }
    let change_count = changes.len();

    match persist(store, changes).await {
        Ok(()) => {
            debug!(changes = change_count, "improvement pass committed");
            true
        }
        Err(error) => {
            warn!(%error, "improvement pass rolled back");
            report.record(&error);
            if let Err(rollback_error) = store.rollback().await {
                report.record(&rollback_error);
            }
            false
        }
    }
}

async fn persist(
    store: &dyn StoryletStore,
    changes: Vec<GraphChange>,
) -> Result<(), ImprovementError> {
    apply_changes(store, changes).await?;
    store.commit().await
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;
    use worldweaver_core::report::Trigger;
    use worldweaver_core::storylet::{Coordinate, Storylet};
    use worldweaver_test_support::{
        FailingStoryletStore, FixedClock, InMemoryStoryletStore, StoreCall, StoryletBuilder,
        fixed_now, graph_of,
    };

    use super::*;
    use crate::domain::commands::ImprovementOptions;
    use crate::domain::deepener::DeepenerConfig;

    fn auto_improve(ids: &[u64], options: ImprovementOptions) -> AutoImprove {
        AutoImprove {
            correlation_id: Uuid::new_v4(),
            trigger: Trigger::AuthorCommit,
            added_storylet_ids: ids.iter().copied().map(StoryletId).collect(),
            options,
        }
    }

    fn dry_run() -> ImprovementOptions {
        ImprovementOptions {
            dry_run: true,
            ..ImprovementOptions::default()
        }
    }

    fn forest_world() -> WorldGraph {
        graph_of([
            StoryletBuilder::new(1, "Forest Edge").at(-3, 0),
            StoryletBuilder::new(2, "Dark Forest Clearing"),
        ])
    }

    fn storylets(graph: &WorldGraph) -> Vec<Storylet> {
        graph.storylets().cloned().collect()
    }

    /// Every storylet is reachable from `start` and either leads somewhere
    /// or ends its thread explicitly.
    fn no_isolation(graph: &WorldGraph) -> bool {
        graph.ids().into_iter().all(|id| {
            let storylet = graph.get(id).unwrap();
            let leads_on = storylet.outbound_targets().any(|t| graph.contains(t));
            !graph.is_isolated(id) && (leads_on || storylet.is_terminal())
        })
    }

    #[test]
    fn test_auto_improve_runs_all_phases_in_order() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = forest_world();

        // Act
        let report = engine.auto_improve(
            &mut graph,
            &auto_improve(&[2], ImprovementOptions::default()),
            &clock,
        );

        // Assert
        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.trigger, Trigger::AuthorCommit);
        assert_eq!(report.storylets_processed, 1);
        assert_eq!(report.coordinates_assigned, 1);
        assert_eq!(report.isolated_fixed, 1);
        assert_eq!(report.return_paths_added, 1);
        assert_eq!(report.variable_storylets_created, 0);
        assert_eq!(report.bridges_inserted, 0);
        assert_eq!(report.previews_updated, 2);
        assert_eq!(
            graph.get(StoryletId(2)).unwrap().coordinate,
            Some(Coordinate::new(-2, 0))
        );
        assert!(no_isolation(&graph));
    }

    #[test]
    fn test_auto_improve_skips_empty_batches() {
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = forest_world();

        let report = engine.auto_improve(&mut graph, &auto_improve(&[], ImprovementOptions::default()), &clock);

        assert!(!should_auto_improve(0));
        assert!(should_auto_improve(1));
        assert_eq!(report.total_improvements(), 0);
        assert!(report.success);
        assert_eq!(graph, forest_world());
    }

    #[test]
    fn test_unknown_added_ids_are_recorded_and_pass_continues() {
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = forest_world();

        let report = engine.auto_improve(
            &mut graph,
            &auto_improve(&[2, 40], ImprovementOptions::default()),
            &clock,
        );

        assert!(!report.success);
        assert_eq!(report.storylets_processed, 1);
        assert_eq!(report.coordinates_assigned, 1);
        assert_eq!(report.errors, vec!["unknown storylet: #40".to_owned()]);
    }

    #[test]
    fn test_dangling_choices_are_reported_once_and_skipped() {
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Square").at(0, 0).choice_to(2).choice_to(9),
            StoryletBuilder::new(2, "Market").choice_to(1),
        ]);

        let report = engine.auto_improve(
            &mut graph,
            &auto_improve(&[2], ImprovementOptions::default()),
            &clock,
        );

        assert_eq!(
            report.errors,
            vec!["graph integrity error: storylet #1 has a choice targeting missing storylet #9".to_owned()]
        );
        assert_eq!(report.coordinates_assigned, 1);
    }

    #[test]
    fn test_torch_lit_gets_a_consumer_during_the_pass() {
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Cave").choice_to(2).sets("torch_lit", json!(true)),
            StoryletBuilder::new(2, "Cavern Hall").choice_to(1),
        ]);

        let report = engine.auto_improve(
            &mut graph,
            &auto_improve(&[1, 2], ImprovementOptions::default()),
            &clock,
        );

        assert_eq!(report.variable_storylets_created, 1);
        let consumer = graph
            .storylets()
            .find(|s| s.requires.get("torch_lit") == Some(&json!(true)))
            .unwrap();
        assert!(graph.reachable_from(StoryletId(1)).contains(&consumer.id));
    }

    #[test]
    fn test_disabled_phases_do_not_run() {
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = forest_world();
        let options = ImprovementOptions {
            run_smoothing: false,
            run_deepening: false,
            dry_run: false,
        };

        let report = engine.auto_improve(&mut graph, &auto_improve(&[2], options), &clock);

        assert_eq!(report.total_improvements(), 1);
        assert!(graph.get(StoryletId(2)).unwrap().choices.is_empty());
    }

    #[test]
    fn test_dry_run_reports_same_counts_and_leaves_graph_untouched() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut dry_graph = forest_world();
        let mut committed_graph = forest_world();

        // Act
        let dry = engine.auto_improve(&mut dry_graph, &auto_improve(&[2], dry_run()), &clock);
        let committed = engine.auto_improve(
            &mut committed_graph,
            &auto_improve(&[2], ImprovementOptions::default()),
            &clock,
        );

        // Assert
        assert_eq!(dry_graph, forest_world());
        assert!(dry.dry_run);
        assert_eq!(
            ImprovementReport {
                dry_run: false,
                ..dry
            },
            committed
        );
    }

    #[test]
    fn test_exhausted_wall_clock_skips_remaining_phases() {
        let config = EngineConfig {
            wall_clock_budget: chrono::TimeDelta::zero(),
            ..EngineConfig::default()
        };
        let engine = ImprovementEngine::new(KeywordTable::builtin(), config);
        let clock = FixedClock(fixed_now());
        let mut graph = forest_world();

        let report = engine.auto_improve(&mut graph, &auto_improve(&[2], ImprovementOptions::default()), &clock);

        assert!(!report.success);
        assert_eq!(report.coordinates_assigned, 1);
        assert_eq!(report.isolated_fixed, 0);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("during smoothing"));
        assert!(report.errors[1].contains("during deepening"));
    }

    #[test]
    fn test_synthesis_cap_ends_phase_with_partial_success() {
        let config = EngineConfig {
            max_synthesized_nodes: 1,
            deepener: DeepenerConfig {
                add_previews: false,
                ..DeepenerConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = ImprovementEngine::new(KeywordTable::builtin(), config);
        let clock = FixedClock(fixed_now());
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Camp")
                .at(0, 0)
                .choice_to(2)
                .sets("alpha", json!(1))
                .sets("beta", json!(1)),
            StoryletBuilder::new(2, "Well").at(1, 0).choice_to(1),
        ]);

        let report = engine.auto_improve(&mut graph, &auto_improve(&[1], ImprovementOptions::default()), &clock);

        assert!(!report.success);
        assert_eq!(report.variable_storylets_created, 1);
        assert!(report.summary().starts_with("Auto-improved (1 total)"));
        assert!(report.errors[0].contains("dead-end variable beta"));
    }

    #[test]
    fn test_one_way_sink_ends_the_pass_with_a_way_out() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Cliff Top").at(0, 0).one_way_to(2),
            StoryletBuilder::new(2, "Sea Below").at(0, 1),
        ]);

        // Act
        let report = engine.auto_improve(&mut graph, &auto_improve(&[1, 2], ImprovementOptions::default()), &clock);

        // Assert
        assert!(report.success);
        assert_eq!(report.isolated_fixed, 1);
        assert!(no_isolation(&graph));
        assert!(graph.get(StoryletId(2)).unwrap().leads_to(StoryletId(1)));
    }

    #[test]
    fn test_setter_at_grid_edge_does_not_abort_the_pass() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Camp")
                .at(i32::MAX, 0)
                .choice_to(2)
                .sets("alpha", json!(1)),
            StoryletBuilder::new(2, "Well").at(i32::MAX - 1, 0).choice_to(1),
        ]);

        // Act
        let report = engine.auto_improve(&mut graph, &auto_improve(&[1, 2], ImprovementOptions::default()), &clock);

        // Assert
        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.variable_storylets_created, 1);
        assert_eq!(
            graph.get(StoryletId(3)).unwrap().coordinate,
            Some(Coordinate::new(i32::MAX, 1))
        );
    }

    #[test]
    fn test_fix_coordinates_places_every_storylet() {
        let engine = ImprovementEngine::default();
        let mut graph = graph_of([
            StoryletBuilder::new(1, "Market"),
            StoryletBuilder::new(2, "Valley"),
            StoryletBuilder::new(3, "Tavern").at(5, 5),
        ]);
        let command = FixCoordinates {
            correlation_id: Uuid::new_v4(),
            dry_run: false,
        };

        let report = engine.fix_coordinates(&mut graph, &command);

        assert_eq!(report.trigger, Trigger::BulkFix);
        assert_eq!(report.storylets_processed, 3);
        assert_eq!(report.coordinates_assigned, 2);
        assert!(graph.storylets().all(|s| s.coordinate.is_some()));
    }

    #[tokio::test]
    async fn test_handle_auto_improve_commits_changes_and_updates_shared_world() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let world = Mutex::new(forest_world());
        let store = InMemoryStoryletStore::new(storylets(&forest_world()));

        // Act
        let report = handle_auto_improve(
            &engine,
            &auto_improve(&[2], ImprovementOptions::default()),
            &world,
            &clock,
            &store,
        )
        .await;

        // Assert
        assert!(report.success);
        let shared = world.lock().await;
        assert_eq!(store.committed(), storylets(&shared));
        assert_eq!(store.calls().last(), Some(&StoreCall::Commit));
        assert!(store.calls().contains(&StoreCall::AddChoice(StoryletId(2))));
    }

    #[tokio::test]
    async fn test_handle_auto_improve_creates_storylets_before_linking_to_them() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let cave = graph_of([
            StoryletBuilder::new(1, "Cave Mouth")
                .at(-4, -1)
                .choice_to(2)
                .sets("torch_lit", json!(true)),
            StoryletBuilder::new(2, "Cavern Hall").at(-3, -1).choice_to(1),
        ]);
        let world = Mutex::new(cave.clone());
        let store = InMemoryStoryletStore::new(storylets(&cave));

        // Act
        let report = handle_auto_improve(
            &engine,
            &auto_improve(&[1, 2], ImprovementOptions::default()),
            &world,
            &clock,
            &store,
        )
        .await;

        // Assert
        assert!(report.success);
        assert_eq!(report.variable_storylets_created, 1);
        let calls = store.calls();
        assert_eq!(calls.first(), Some(&StoreCall::Create(StoryletId(3))));
        assert!(calls.iter().skip(1).any(|call| matches!(
            call,
            StoreCall::Update(id, _) | StoreCall::AddChoice(id) if *id == StoryletId(1)
        )));
        assert_eq!(store.committed(), storylets(&*world.lock().await));
    }

    #[tokio::test]
    async fn test_handle_auto_improve_dry_run_never_touches_store() {
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let world = Mutex::new(forest_world());
        let store = InMemoryStoryletStore::new(storylets(&forest_world()));

        let report = handle_auto_improve(&engine, &auto_improve(&[2], dry_run()), &world, &clock, &store).await;

        assert_eq!(report.coordinates_assigned, 1);
        assert!(store.calls().is_empty());
        assert_eq!(*world.lock().await, forest_world());
    }

    #[tokio::test]
    async fn test_handle_auto_improve_rolls_back_when_commit_fails() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let world = Mutex::new(forest_world());
        let store = InMemoryStoryletStore::failing_on_commit(storylets(&forest_world()));

        // Act
        let report = handle_auto_improve(
            &engine,
            &auto_improve(&[2], ImprovementOptions::default()),
            &world,
            &clock,
            &store,
        )
        .await;

        // Assert
        assert!(!report.success);
        assert_eq!(report.errors, vec!["store error: commit rejected".to_owned()]);
        assert_eq!(report.coordinates_assigned, 1);
        assert_eq!(store.calls().last(), Some(&StoreCall::Rollback));
        assert_eq!(store.committed(), storylets(&forest_world()));
        assert_eq!(*world.lock().await, forest_world());
    }

    #[tokio::test]
    async fn test_handle_auto_improve_survives_unreachable_store() {
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let world = Mutex::new(forest_world());

        let report = handle_auto_improve(
            &engine,
            &auto_improve(&[2], ImprovementOptions::default()),
            &world,
            &clock,
            &FailingStoryletStore,
        )
        .await;

        assert!(!report.success);
        assert_eq!(report.errors, vec!["store error: connection refused".to_owned()]);
        assert_eq!(*world.lock().await, forest_world());
    }

    #[tokio::test]
    async fn test_concurrent_passes_on_one_world_are_serialised() {
        // Arrange
        let engine = ImprovementEngine::default();
        let clock = FixedClock(fixed_now());
        let world: SharedWorld = Arc::new(Mutex::new(forest_world()));
        let store = InMemoryStoryletStore::new(storylets(&forest_world()));
        let first = auto_improve(&[2], ImprovementOptions::default());
        let second = auto_improve(&[2], ImprovementOptions::default());

        // Act
        let (a, b) = tokio::join!(
            handle_auto_improve(&engine, &first, &world, &clock, &store),
            handle_auto_improve(&engine, &second, &world, &clock, &store),
        );

        // Assert: one pass did the work, the other found nothing left.
        let mut totals = [a.total_improvements(), b.total_improvements()];
        totals.sort_unstable();
        assert_eq!(totals, [0, 5]);
        let commits = store
            .calls()
            .into_iter()
            .filter(|call| *call == StoreCall::Commit)
            .count();
        assert_eq!(commits, 1);
        assert_eq!(store.committed(), storylets(&*world.lock().await));
    }

    #[tokio::test]
    async fn test_handle_fix_coordinates_persists_assignments() {
        let engine = ImprovementEngine::default();
        let world = Mutex::new(forest_world());
        let store = InMemoryStoryletStore::new(storylets(&forest_world()));
        let command = FixCoordinates {
            correlation_id: Uuid::new_v4(),
            dry_run: false,
        };

        let report = handle_fix_coordinates(&engine, &command, &world, &store).await;

        assert_eq!(report.coordinates_assigned, 1);
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Update(
                    StoryletId(2),
                    worldweaver_core::graph::StoryletPatch {
                        coordinate: Some(Coordinate::new(-2, 0)),
                        choices: None,
                    }
                ),
                StoreCall::Commit,
            ]
        );
    }
}
