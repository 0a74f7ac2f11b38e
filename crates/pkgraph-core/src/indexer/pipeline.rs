//! Per-project run orchestration: stage sequencing, persisted run state and
//! the run summary.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::errors::{GraphError, GraphResult};
use crate::indexer::aggregate::aggregate_package_imports;
use crate::indexer::imports::{annotate_entities, link_imports, AmbiguousImport, ParseFailure};
use crate::indexer::metrics::{annotate_lines_of_code, compute_quality};
use crate::indexer::packages::{build_package_hierarchy, link_classes_to_packages};
use crate::indexer::pagerank::{compute_importance, CentralityStrategy, PageRank, Projection};
use crate::models::props;
use crate::store::GraphStore;

/// Stages of one project run, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RunStage {
    Init,
    EntitiesAnnotated,
    PackagesBuilt,
    ClassPackageLinked,
    ImportsResolved,
    PackageImportsAggregated,
    MetricsComputed,
}

impl RunStage {
    pub const ALL: [RunStage; 7] = [
        RunStage::Init,
        RunStage::EntitiesAnnotated,
        RunStage::PackagesBuilt,
        RunStage::ClassPackageLinked,
        RunStage::ImportsResolved,
        RunStage::PackageImportsAggregated,
        RunStage::MetricsComputed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RunStage::Init => "init",
            RunStage::EntitiesAnnotated => "entities_annotated",
            RunStage::PackagesBuilt => "packages_built",
            RunStage::ClassPackageLinked => "class_package_linked",
            RunStage::ImportsResolved => "imports_resolved",
            RunStage::PackageImportsAggregated => "package_imports_aggregated",
            RunStage::MetricsComputed => "metrics_computed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == raw)
    }

    /// Immediate successor; `None` once metrics are computed.
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self as usize + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self == RunStage::MetricsComputed
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn run_state_key(project_id: &str) -> String {
    format!("run_state:{project_id}")
}

/// Progress of one project run, persisted in `graph_meta`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunState {
    project_id: String,
    stage: RunStage,
}

impl RunState {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            stage: RunStage::Init,
        }
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    /// Move to `next`, which must be the immediate successor.
    pub fn advance(&mut self, next: RunStage) -> GraphResult<()> {
        if self.stage.next() != Some(next) {
            return Err(GraphError::Pipeline(format!(
                "invalid run state transition for project {}: {} -> {}",
                self.project_id, self.stage, next
            )));
        }
        self.stage = next;
        Ok(())
    }

    pub fn persist<S: GraphStore + ?Sized>(&self, store: &S) -> GraphResult<()> {
        store.execute_query(
            "INSERT INTO graph_meta (key, value) VALUES (:key, :value) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            &props(json!({
                "key": run_state_key(&self.project_id),
                "value": self.stage.as_str(),
            })),
        )?;
        Ok(())
    }

    /// Stage persisted by the last run of `project_id`, if any.
    pub fn load<S: GraphStore + ?Sized>(
        store: &S,
        project_id: &str,
    ) -> GraphResult<Option<RunStage>> {
        let rows = store.execute_query(
            "SELECT value FROM graph_meta WHERE key = :key",
            &props(json!({ "key": run_state_key(project_id) })),
        )?;
        let Some(raw) = rows.first().and_then(|row| row.get("value")).and_then(|v| v.as_str())
        else {
            return Ok(None);
        };
        RunStage::parse(raw)
            .map(Some)
            .ok_or_else(|| GraphError::Store(format!("unknown run state {raw:?}")))
    }

    fn advance_and_persist<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        next: RunStage,
    ) -> GraphResult<()> {
        self.advance(next)?;
        self.persist(store)
    }
}

/// Counts and findings of one project run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub project_id: String,
    pub entities: usize,
    pub entities_annotated: usize,
    pub parse_failures: Vec<ParseFailure>,
    pub packages_created: usize,
    pub packages_reused: usize,
    pub package_containment_edges: usize,
    pub class_package_edges: usize,
    pub imports_created: usize,
    /// Class-package, import and package-import edges that no longer match
    /// the sources and were removed.
    pub stale_edges_removed: usize,
    pub unresolved_imports: usize,
    pub ambiguous_imports: Vec<AmbiguousImport>,
    pub package_imports_merged: usize,
    pub packages_ranked: usize,
    pub packages_scored: usize,
    pub elapsed_ms: i64,
}

/// Run every stage for `project_id` with the default PageRank strategy.
pub fn run_pipeline<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    config: &PipelineConfig,
) -> GraphResult<RunSummary> {
    let strategy = PageRank::from(&config.pagerank);
    run_pipeline_with(store, project_id, config, &strategy)
}

/// Run every stage for `project_id`, scoring importance with `strategy`.
///
/// A projection left behind by an earlier run that died is discarded first.
/// Store failures abort the run; the persisted run state then names the
/// last completed stage.
pub fn run_pipeline_with<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    config: &PipelineConfig,
    strategy: &dyn CentralityStrategy,
) -> GraphResult<RunSummary> {
    config.validate()?;
    let started = Instant::now();
    let plugin_id = config.plugin_id.as_str();
    let workers = config.effective_workers();

    if let Some(previous) = RunState::load(store, project_id)? {
        if !previous.is_terminal() {
            warn!(
                "Previous run of project {} stopped after stage {}; re-running all stages",
                project_id, previous
            );
        }
    }
    Projection::discard_stale(store, project_id)?;
    let mut state = RunState::new(project_id);
    state.persist(store)?;
    let mut summary = RunSummary {
        project_id: project_id.to_string(),
        ..RunSummary::default()
    };

    let annotated = annotate_entities(store, project_id, workers)?;
    summary.entities = annotated.entities;
    summary.entities_annotated = annotated.annotated;
    summary.parse_failures = annotated.failures;
    state.advance_and_persist(store, RunStage::EntitiesAnnotated)?;

    let (index, hierarchy) = build_package_hierarchy(
        store,
        project_id,
        plugin_id,
        config.synthesize_ancestor_packages,
    )?;
    summary.packages_created = hierarchy.packages_created;
    summary.packages_reused = hierarchy.packages_reused;
    summary.package_containment_edges = hierarchy.containment_edges;
    state.advance_and_persist(store, RunStage::PackagesBuilt)?;

    let linked = link_classes_to_packages(store, project_id, plugin_id, &index)?;
    summary.class_package_edges = linked.edges_created;
    summary.stale_edges_removed += linked.stale_removed;
    state.advance_and_persist(store, RunStage::ClassPackageLinked)?;

    let resolved = link_imports(store, project_id, plugin_id, workers)?;
    summary.imports_created = resolved.imports_created;
    summary.stale_edges_removed += resolved.stale_removed;
    summary.unresolved_imports = resolved.unresolved;
    summary.ambiguous_imports = resolved.ambiguous;
    state.advance_and_persist(store, RunStage::ImportsResolved)?;

    let aggregated = aggregate_package_imports(store, project_id, plugin_id)?;
    summary.package_imports_merged = aggregated.created;
    summary.stale_edges_removed += aggregated.stale_removed;
    state.advance_and_persist(store, RunStage::PackageImportsAggregated)?;

    annotate_lines_of_code(store, project_id, workers)?;
    summary.packages_ranked = compute_importance(store, project_id, plugin_id, strategy)?;
    summary.packages_scored = compute_quality(store, project_id, plugin_id)?.packages_scored;
    state.advance_and_persist(store, RunStage::MetricsComputed)?;

    summary.elapsed_ms = started.elapsed().as_millis() as i64;
    info!(
        project_id,
        entities = summary.entities,
        packages = index.len(),
        imports = summary.imports_created,
        elapsed_ms = summary.elapsed_ms,
        "Package metrics run finished"
    );
    Ok(summary)
}

/// Run the package metrics pipeline against the database at `db_path`.
#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(signature = (db_path, project_id, config_json=None))]
pub fn run_package_metrics(
    py: pyo3::Python<'_>,
    db_path: &str,
    project_id: &str,
    config_json: Option<&str>,
) -> pyo3::PyResult<pyo3::PyObject> {
    let config = match config_json {
        Some(raw) => PipelineConfig::from_json(raw)?,
        None => PipelineConfig::from_env()?,
    };
    let store = crate::store::SqliteGraphStore::open(db_path)?;
    let summary = py.allow_threads(|| run_pipeline(&store, project_id, &config))?;
    let json_str = serde_json::to_string(&summary).map_err(GraphError::from)?;
    let json_module = py.import("json")?;
    json_module
        .call_method1("loads", (json_str,))
        .map(|o| o.into())
}
