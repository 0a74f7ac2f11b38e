//! Package importance: a pluggable centrality strategy run over a named
//! projection of the package-import graph.

use std::collections::HashMap;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::PageRankConfig;
use crate::errors::{GraphError, GraphResult};
use crate::models::{props, NodeId, PROP_PAGERANK};
use crate::store::GraphStore;

/// Scores every node of a directed graph.
pub trait CentralityStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Score for each id in `nodes`. Edges whose endpoints are not in
    /// `nodes` are ignored.
    fn compute(
        &self,
        nodes: &[NodeId],
        edges: &[(NodeId, NodeId)],
    ) -> GraphResult<HashMap<NodeId, f64>>;
}

/// Power-iteration PageRank. Rank held by nodes without outgoing edges is
/// spread evenly over all nodes, so scores sum to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRank {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PageRank {
    fn default() -> Self {
        Self::from(&PageRankConfig::default())
    }
}

impl From<&PageRankConfig> for PageRank {
    fn from(config: &PageRankConfig) -> Self {
        Self {
            damping: config.damping,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        }
    }
}

impl CentralityStrategy for PageRank {
    fn name(&self) -> &str {
        "pagerank"
    }

    fn compute(
        &self,
        nodes: &[NodeId],
        edges: &[(NodeId, NodeId)],
    ) -> GraphResult<HashMap<NodeId, f64>> {
        if nodes.is_empty() {
            return Ok(HashMap::new());
        }

        let position: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (source, target) in edges {
            if let (Some(&s), Some(&t)) = (position.get(source), position.get(target)) {
                adjacency[s].push(t);
            }
        }

        let damping = self.damping;
        let node_count = nodes.len() as f64;
        let mut scores = vec![1.0 / node_count; nodes.len()];

        let mut delta = f64::INFINITY;
        let mut iterations = 0;
        while delta > self.tolerance && iterations < self.max_iterations {
            let dangling_mass: f64 = adjacency
                .iter()
                .zip(&scores)
                .filter(|(targets, _)| targets.is_empty())
                .map(|(_, score)| score)
                .sum();
            let base = (1.0 - damping) / node_count + damping * dangling_mass / node_count;
            let mut next_scores = vec![base; nodes.len()];

            for (source, targets) in adjacency.iter().enumerate() {
                if targets.is_empty() {
                    continue;
                }
                let share = damping * scores[source] / targets.len() as f64;
                for &target in targets {
                    next_scores[target] += share;
                }
            }

            delta = next_scores
                .iter()
                .zip(&scores)
                .map(|(next, prev)| (next - prev).abs())
                .sum();
            scores = next_scores;
            iterations += 1;
        }
        debug!(iterations, delta, "PageRank finished");

        Ok(nodes.iter().copied().zip(scores).collect())
    }
}

/// Name under which a project's package-import graph is projected.
pub fn projection_name(project_id: &str) -> String {
    format!("package-importance:{project_id}")
}

/// A named in-store projection of a project's `Package` nodes and the
/// `PACKAGE_IMPORTS` edges between them.
///
/// The projection is removed by [`Projection::drop_projection`], or when the
/// guard goes out of scope without it.
pub struct Projection<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    name: String,
    released: bool,
}

impl<'a, S: GraphStore + ?Sized> Projection<'a, S> {
    pub fn create(store: &'a S, project_id: &str, plugin_id: &str) -> GraphResult<Self> {
        let name = projection_name(project_id);
        let existing = store.execute_query(
            "SELECT name FROM projections WHERE name = :name",
            &props(json!({ "name": name })),
        )?;
        if !existing.is_empty() {
            return Err(GraphError::Store(format!("projection {name} already exists")));
        }
        store.execute_query(
            "INSERT INTO projections (name, project_id) VALUES (:name, :project_id)",
            &props(json!({ "name": name, "project_id": project_id })),
        )?;

        let projection = Self {
            store,
            name,
            released: false,
        };
        projection.store.execute_query(
            "INSERT INTO projection_nodes (projection, node_id)
             SELECT :name, id FROM nodes
             WHERE label = 'Package'
               AND json_extract(properties, '$.\"projectId\"') = :project_id
               AND json_extract(properties, '$.\"pluginId\"') = :plugin_id",
            &props(json!({
                "name": projection.name,
                "project_id": project_id,
                "plugin_id": plugin_id,
            })),
        )?;
        projection.store.execute_query(
            "INSERT INTO projection_edges (projection, source_id, target_id)
             SELECT :name, e.source_id, e.target_id FROM edges e
             JOIN projection_nodes s ON s.projection = :name AND s.node_id = e.source_id
             JOIN projection_nodes t ON t.projection = :name AND t.node_id = e.target_id
             WHERE e.label = 'PACKAGE_IMPORTS'",
            &props(json!({ "name": projection.name })),
        )?;
        debug!("Projection {} created", projection.name);
        Ok(projection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_ids(&self, query: &str, columns: &[&str]) -> GraphResult<Vec<Vec<NodeId>>> {
        self.store
            .execute_query(query, &props(json!({ "name": self.name })))?
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        row.get(*column).and_then(|v| v.as_i64()).ok_or_else(|| {
                            GraphError::Query(format!("projection row without {column}"))
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Projected node ids, ascending.
    pub fn nodes(&self) -> GraphResult<Vec<NodeId>> {
        let rows = self.read_ids(
            "SELECT node_id FROM projection_nodes WHERE projection = :name ORDER BY node_id",
            &["node_id"],
        )?;
        Ok(rows.into_iter().map(|row| row[0]).collect())
    }

    pub fn edges(&self) -> GraphResult<Vec<(NodeId, NodeId)>> {
        let rows = self.read_ids(
            "SELECT source_id, target_id FROM projection_edges WHERE projection = :name \
             ORDER BY source_id, target_id",
            &["source_id", "target_id"],
        )?;
        Ok(rows.into_iter().map(|row| (row[0], row[1])).collect())
    }

    /// Run `strategy` over the projection and write each score to the
    /// node's `pagerank`. Returns the number of nodes written.
    pub fn run(&self, strategy: &dyn CentralityStrategy) -> GraphResult<usize> {
        let nodes = self.nodes()?;
        let edges = self.edges()?;
        let scores = strategy.compute(&nodes, &edges)?;
        for id in &nodes {
            let score = scores.get(id).copied().ok_or_else(|| {
                GraphError::Pipeline(format!(
                    "{} produced no score for node {id}",
                    strategy.name()
                ))
            })?;
            self.store
                .update_node(*id, props(json!({ PROP_PAGERANK: score })))?;
        }
        Ok(nodes.len())
    }

    /// Remove a projection of `project_id` whose guard never ran, such as
    /// one left by a process that died mid-run. Returns whether one existed.
    pub fn discard_stale(store: &S, project_id: &str) -> GraphResult<bool> {
        let name = projection_name(project_id);
        let removed = delete_projection(store, &name)?;
        if removed {
            warn!("Discarded stale projection {}", name);
        }
        Ok(removed)
    }

    fn release(&self) -> GraphResult<()> {
        delete_projection(self.store, &self.name)?;
        debug!("Projection {} dropped", self.name);
        Ok(())
    }

    pub fn drop_projection(mut self) -> GraphResult<()> {
        self.released = true;
        self.release()
    }
}

impl<S: GraphStore + ?Sized> Drop for Projection<'_, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release() {
            warn!("Failed to drop projection {}: {}", self.name, e);
        }
    }
}

/// Delete the rows of projection `name`; true when the projection existed.
fn delete_projection<S: GraphStore + ?Sized>(store: &S, name: &str) -> GraphResult<bool> {
    let params = props(json!({ "name": name }));
    store.execute_query("DELETE FROM projection_edges WHERE projection = :name", &params)?;
    store.execute_query("DELETE FROM projection_nodes WHERE projection = :name", &params)?;
    let removed = store.execute_query(
        "DELETE FROM projections WHERE name = :name RETURNING name",
        &params,
    )?;
    Ok(!removed.is_empty())
}

/// Score every package of the project with `strategy`: create the
/// projection, run, drop. Any failure aborts with the projection removed.
pub fn compute_importance<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
    strategy: &dyn CentralityStrategy,
) -> GraphResult<usize> {
    let projection = Projection::create(store, project_id, plugin_id)?;
    let ranked = projection.run(strategy)?;
    projection.drop_projection()?;
    info!(project_id, ranked, strategy = strategy.name(), "Package importance computed");
    Ok(ranked)
}
