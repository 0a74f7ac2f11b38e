//! Node/link graphs handed to front ends.

use serde::Serialize;

use crate::errors::GraphResult;
use crate::indexer::{project_entities, project_packages};
use crate::models::{
    ClassEntity, EdgeDirection, GraphNode, NodeId, PackageNode, IMPORTS, IN_PACKAGE,
    KIND_PACKAGE, PACKAGE_IMPORTS,
};
use crate::store::GraphStore;

pub const LINK_PACKAGE_IMPORTS: &str = "package-imports";
pub const LINK_IMPORTS: &str = "imports";
pub const LINK_IN_PACKAGE: &str = "in-package";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewLink {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphView<N> {
    pub nodes: Vec<N>,
    pub links: Vec<ViewLink>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedPackage {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "pageRank")]
    pub page_rank: f64,
    /// `-1` until quality has been computed.
    pub quality: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "packageName")]
    pub package_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackageEntry {
    pub id: NodeId,
    pub name: String,
}

/// Outgoing `label` edges of each node, optionally restricted to one kind.
fn outgoing_links<S: GraphStore + ?Sized>(
    store: &S,
    nodes: &[GraphNode],
    label: &str,
    kind: Option<&str>,
    link_kind: &'static str,
) -> GraphResult<Vec<ViewLink>> {
    let mut links = Vec::new();
    for node in nodes {
        for edge in store.get_edges(node, label, EdgeDirection::Outgoing)? {
            if kind.is_some_and(|k| edge.kind() != Some(k)) {
                continue;
            }
            links.push(ViewLink {
                source: edge.start.id,
                target: edge.end.id,
                kind: link_kind,
            });
        }
    }
    Ok(links)
}

/// Packages with importance and quality, linked by package imports.
pub fn package_rank_graph<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
) -> GraphResult<GraphView<RankedPackage>> {
    let packages = project_packages(store, project_id)?;
    let nodes = packages
        .iter()
        .map(PackageNode::from_node)
        .map(|p| RankedPackage {
            id: p.id,
            name: p.name,
            page_rank: p.pagerank.unwrap_or(0.0),
            quality: p.quality.unwrap_or(-1),
        })
        .collect();
    let links = outgoing_links(store, &packages, PACKAGE_IMPORTS, None, LINK_PACKAGE_IMPORTS)?;
    Ok(GraphView { nodes, links })
}

/// Classes by fully-qualified name, linked by resolved imports.
pub fn class_import_graph<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
) -> GraphResult<GraphView<ClassNode>> {
    let entities = project_entities(store, project_id)?;
    let nodes = entities
        .iter()
        .map(ClassEntity::from_node)
        .map(|e| ClassNode {
            id: e.id,
            name: e.full_class_name.unwrap_or_default(),
            package_name: e.package_name.unwrap_or_default(),
        })
        .collect();
    let links = outgoing_links(store, &entities, IMPORTS, None, LINK_IMPORTS)?;
    Ok(GraphView { nodes, links })
}

/// Packages linked child → parent by containment.
pub fn package_structure<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
) -> GraphResult<GraphView<PackageEntry>> {
    let packages = project_packages(store, project_id)?;
    let nodes = packages
        .iter()
        .map(PackageNode::from_node)
        .map(|p| PackageEntry { id: p.id, name: p.name })
        .collect();
    let links = outgoing_links(
        store,
        &packages,
        IN_PACKAGE,
        Some(KIND_PACKAGE),
        LINK_IN_PACKAGE,
    )?;
    Ok(GraphView { nodes, links })
}

fn to_json<T: Serialize>(view: &T) -> GraphResult<String> {
    Ok(serde_json::to_string(view)?)
}

#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(name = "package_rank_graph")]
pub fn py_package_rank_graph(db_path: &str, project_id: &str) -> pyo3::PyResult<String> {
    let store = crate::store::SqliteGraphStore::open(db_path)?;
    Ok(to_json(&package_rank_graph(&store, project_id)?)?)
}

#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(name = "class_import_graph")]
pub fn py_class_import_graph(db_path: &str, project_id: &str) -> pyo3::PyResult<String> {
    let store = crate::store::SqliteGraphStore::open(db_path)?;
    Ok(to_json(&class_import_graph(&store, project_id)?)?)
}

#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(name = "package_structure")]
pub fn py_package_structure(db_path: &str, project_id: &str) -> pyo3::PyResult<String> {
    let store = crate::store::SqliteGraphStore::open(db_path)?;
    Ok(to_json(&package_structure(&store, project_id)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::indexer::pipeline::run_pipeline;
    use crate::store::SqliteGraphStore;
    use crate::test_support::{add_entity, java_class, PROJECT};

    fn indexed_store() -> SqliteGraphStore {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        add_entity(&store, "Foo", &java_class("com.a", "Foo", &["com.a.b.Bar"], 2));
        add_entity(&store, "Bar", &java_class("com.a.b", "Bar", &[], 3));
        run_pipeline(&store, PROJECT, &PipelineConfig::default()).unwrap();
        store
    }

    #[test]
    fn rank_graph_before_metrics_uses_placeholders() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        crate::test_support::add_annotated_entity(&store, "A", "x");
        crate::indexer::packages::build_package_hierarchy(&store, PROJECT, "package-metrics", false)
            .unwrap();

        let view = package_rank_graph(&store, PROJECT).unwrap();
        assert_eq!(view.nodes.len(), 1);
        assert_eq!(view.nodes[0].page_rank, 0.0);
        assert_eq!(view.nodes[0].quality, -1);
        assert!(view.links.is_empty());
    }

    #[test]
    fn rank_graph_links_package_imports() {
        let store = indexed_store();
        let view = package_rank_graph(&store, PROJECT).unwrap();
        assert_eq!(view.nodes.len(), 2);
        assert!(view.nodes.iter().all(|n| n.page_rank > 0.0 && n.quality == 6));
        assert_eq!(view.links.len(), 1);
        let source = view.nodes.iter().find(|n| n.name == "com.a").unwrap();
        assert_eq!(view.links[0].source, source.id);
        assert_eq!(view.links[0].kind, LINK_PACKAGE_IMPORTS);

        let json: serde_json::Value = serde_json::from_str(&to_json(&view).unwrap()).unwrap();
        assert!(json["nodes"][0].get("pageRank").is_some());
    }

    #[test]
    fn class_graph_uses_full_names() {
        let store = indexed_store();
        let view = class_import_graph(&store, PROJECT).unwrap();
        let names: Vec<&str> = view.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["com.a.Foo", "com.a.b.Bar"]);
        assert_eq!(view.nodes[1].package_name, "com.a.b");
        assert_eq!(view.links.len(), 1);
        assert_eq!(view.links[0].kind, LINK_IMPORTS);
    }

    #[test]
    fn structure_links_child_to_parent_only() {
        let store = indexed_store();
        let view = package_structure(&store, PROJECT).unwrap();
        assert_eq!(view.nodes.len(), 2);
        assert_eq!(view.links.len(), 1);
        let child = view.nodes.iter().find(|n| n.name == "com.a.b").unwrap();
        let parent = view.nodes.iter().find(|n| n.name == "com.a").unwrap();
        assert_eq!((view.links[0].source, view.links[0].target), (child.id, parent.id));
    }
}
