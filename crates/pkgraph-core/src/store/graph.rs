//! GraphStore trait definition
//!
//! The narrow set of property-graph operations the indexer issues. Stages
//! take `&dyn GraphStore` (or a generic `S: GraphStore`) so the embedded
//! SQLite store can be swapped for another backend, or wrapped in tests.

use crate::errors::GraphResult;
use crate::models::{EdgeDirection, GraphEdge, GraphNode, NodeId, Properties, PROP_KIND};

/// Abstract interface for graph database operations.
pub trait GraphStore: Send + Sync {
    /// Create a node and return it with its store-assigned id.
    fn create_node(&self, label: &str, properties: Properties) -> GraphResult<GraphNode>;

    /// All nodes with `label` whose properties equal every entry of
    /// `filter`, ordered by ascending id.
    fn find_nodes(&self, label: &str, filter: &Properties) -> GraphResult<Vec<GraphNode>>;

    /// Merge `properties` into the node's existing properties.
    fn update_node(&self, id: NodeId, properties: Properties) -> GraphResult<()>;

    /// Edges with `label` entering or leaving `node`, ordered by edge id.
    fn get_edges(
        &self,
        node: &GraphNode,
        label: &str,
        direction: EdgeDirection,
    ) -> GraphResult<Vec<GraphEdge>>;

    /// Create a directed edge. No deduplication is performed.
    fn create_edge(
        &self,
        from: &GraphNode,
        to: &GraphNode,
        label: &str,
        properties: Properties,
    ) -> GraphResult<GraphEdge>;

    /// Remove one edge by id.
    fn delete_edge(&self, id: i64) -> GraphResult<()>;

    /// Execute a single native query with named parameters and return its
    /// rows as column-name keyed maps.
    fn execute_query(&self, query: &str, parameters: &Properties) -> GraphResult<Vec<Properties>>;
}

/// Create `label` from `from` to `to` unless an edge with the same label
/// and `kind` already connects them. Returns whether an edge was created.
pub fn ensure_edge<S: GraphStore + ?Sized>(
    store: &S,
    from: &GraphNode,
    to: &GraphNode,
    label: &str,
    properties: Properties,
) -> GraphResult<bool> {
    let kind = properties.get(PROP_KIND);
    let exists = store
        .get_edges(from, label, EdgeDirection::Outgoing)?
        .iter()
        .any(|edge| edge.end.id == to.id && edge.properties.get(PROP_KIND) == kind);
    if exists {
        return Ok(false);
    }
    store.create_edge(from, to, label, properties)?;
    Ok(true)
}

/// Delete the outgoing `label` edges of `from` whose properties contain every
/// entry of `owner` and whose target is not in `keep`. Returns how many were
/// removed.
pub fn prune_edges<S: GraphStore + ?Sized>(
    store: &S,
    from: &GraphNode,
    label: &str,
    owner: &Properties,
    keep: &[NodeId],
) -> GraphResult<usize> {
    let mut removed = 0;
    for edge in store.get_edges(from, label, EdgeDirection::Outgoing)? {
        let owned = owner
            .iter()
            .all(|(key, value)| edge.properties.get(key) == Some(value));
        if owned && !keep.contains(&edge.end.id) {
            store.delete_edge(edge.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}
