pub mod aggregate;
pub mod imports;
pub mod metrics;
pub mod packages;
pub mod pagerank;
pub mod parser;
pub mod pipeline;

use crate::errors::GraphResult;
use crate::models::{props, GraphNode, Properties, ENTITY_LABEL, PACKAGE_LABEL, PROP_PROJECT_ID};
use crate::store::GraphStore;

pub(crate) fn project_filter(project_id: &str) -> Properties {
    props(serde_json::json!({ PROP_PROJECT_ID: project_id }))
}

/// Every `Entity` node of the project, ordered by id.
pub(crate) fn project_entities<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
) -> GraphResult<Vec<GraphNode>> {
    store.find_nodes(ENTITY_LABEL, &project_filter(project_id))
}

/// Every `Package` node of the project, ordered by id.
pub(crate) fn project_packages<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
) -> GraphResult<Vec<GraphNode>> {
    store.find_nodes(PACKAGE_LABEL, &project_filter(project_id))
}

/// Run `work` over `items` on a rayon pool of `workers` threads, falling
/// back to sequential execution if the pool cannot be built. Output order
/// matches input order.
pub(crate) fn parallel_map<T, R, F>(items: &[T], workers: usize, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    use rayon::prelude::*;

    if items.is_empty() {
        return Vec::new();
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();
    match pool {
        Ok(pool) => pool.install(|| items.par_iter().map(&work).collect()),
        Err(_) => items.iter().map(&work).collect(),
    }
}
