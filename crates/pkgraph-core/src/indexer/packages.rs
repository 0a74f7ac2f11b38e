//! Package hierarchy construction and class-to-package linking.
//!
//! Packages are derived from the `packageName` of a project's entities. One
//! `Package` node exists per `(projectId, pluginId, name)`; re-running reuses
//! the existing node instead of inserting a duplicate.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{GraphError, GraphResult};
use crate::indexer::project_entities;
use crate::models::{
    edge_props, parent_package_name, props, ClassEntity, GraphNode, IN_PACKAGE,
    KIND_CLASS_PACKAGE, KIND_PACKAGE, PACKAGE_LABEL, PROP_NAME, PROP_PLUGIN_ID, PROP_PROJECT_ID,
};
use crate::store::{ensure_edge, prune_edges, GraphStore};

/// Name → package node lookup built once per run and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct PackageIndex {
    by_name: IndexMap<String, GraphNode>,
}

impl PackageIndex {
    pub fn get(&self, name: &str) -> Option<&GraphNode> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Packages in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GraphNode)> {
        self.by_name.iter().map(|(name, node)| (name.as_str(), node))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HierarchyStats {
    pub packages_created: usize,
    pub packages_reused: usize,
    pub containment_edges: usize,
    pub unresolved_parents: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LinkStats {
    pub edges_created: usize,
    pub already_linked: usize,
    /// Links to a package the class no longer declares.
    pub stale_removed: usize,
}

/// Distinct package names of `entities`, including `""` for entities in the
/// unnamed package.
pub fn distinct_package_names(entities: &[ClassEntity]) -> BTreeSet<String> {
    entities
        .iter()
        .map(|e| e.package_or_root().to_string())
        .collect()
}

/// Proper ancestors of a dotted name, nearest first, excluding the root.
fn ancestor_names(name: &str) -> impl Iterator<Item = &str> {
    name.char_indices()
        .rev()
        .filter(|(_, c)| *c == '.')
        .map(move |(idx, _)| &name[..idx])
}

fn find_or_create_package<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
    name: &str,
    stats: &mut HierarchyStats,
) -> GraphResult<GraphNode> {
    let key = props(serde_json::json!({
        PROP_PROJECT_ID: project_id,
        PROP_PLUGIN_ID: plugin_id,
        PROP_NAME: name,
    }));
    let mut existing = store.find_nodes(PACKAGE_LABEL, &key)?;
    if !existing.is_empty() {
        if existing.len() > 1 {
            warn!(
                "Found {} package nodes named {:?} in project {}; using id {}",
                existing.len(),
                name,
                project_id,
                existing[0].id
            );
        }
        stats.packages_reused += 1;
        return Ok(existing.swap_remove(0));
    }
    stats.packages_created += 1;
    store.create_node(PACKAGE_LABEL, key)
}

/// Materialise one package node per distinct package name of the project
/// and connect each package to its parent with `IN_PACKAGE {kind=package}`.
///
/// A parent name that is not itself a package gets no edge unless
/// `synthesize_ancestors` is set, in which case the missing ancestors are
/// created first.
pub fn build_package_hierarchy<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
    synthesize_ancestors: bool,
) -> GraphResult<(PackageIndex, HierarchyStats)> {
    let entities: Vec<ClassEntity> = project_entities(store, project_id)?
        .iter()
        .map(ClassEntity::from_node)
        .collect();
    let mut names = distinct_package_names(&entities);
    if synthesize_ancestors {
        let ancestors: Vec<String> = names
            .iter()
            .flat_map(|name| ancestor_names(name).map(str::to_string).collect::<Vec<_>>())
            .collect();
        names.extend(ancestors);
    }

    let mut stats = HierarchyStats::default();
    let mut by_name = IndexMap::with_capacity(names.len());
    for name in names {
        let node = find_or_create_package(store, project_id, plugin_id, &name, &mut stats)?;
        by_name.insert(name, node);
    }
    let index = PackageIndex { by_name };

    for (name, node) in index.iter() {
        let Some(parent_name) = parent_package_name(name) else {
            continue;
        };
        match index.get(parent_name) {
            Some(parent) => {
                if ensure_edge(
                    store,
                    node,
                    parent,
                    IN_PACKAGE,
                    edge_props(project_id, plugin_id, KIND_PACKAGE),
                )? {
                    stats.containment_edges += 1;
                }
            }
            None => {
                debug!("Package {:?} has no materialised parent {:?}", name, parent_name);
                stats.unresolved_parents += 1;
            }
        }
    }

    info!(
        project_id,
        packages = index.len(),
        created = stats.packages_created,
        containment_edges = stats.containment_edges,
        "Package hierarchy built"
    );
    Ok((index, stats))
}

/// Connect every entity of the project to its package with
/// `IN_PACKAGE {kind=class-package}`, replacing a link this plugin made to a
/// package the entity has since left.
pub fn link_classes_to_packages<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
    index: &PackageIndex,
) -> GraphResult<LinkStats> {
    let mut stats = LinkStats::default();
    for node in project_entities(store, project_id)? {
        let entity = ClassEntity::from_node(&node);
        let package_name = entity.package_or_root();
        let package = index.get(package_name).ok_or_else(|| {
            GraphError::Pipeline(format!(
                "entity {} refers to package {:?} which is not in the package index",
                entity.id, package_name
            ))
        })?;
        let link = edge_props(project_id, plugin_id, KIND_CLASS_PACKAGE);
        stats.stale_removed += prune_edges(store, &node, IN_PACKAGE, &link, &[package.id])?;
        if ensure_edge(store, &node, package, IN_PACKAGE, link)? {
            stats.edges_created += 1;
        } else {
            stats.already_linked += 1;
        }
    }
    info!(
        project_id,
        created = stats.edges_created,
        stale_removed = stats.stale_removed,
        "Classes linked to packages"
    );
    Ok(stats)
}
