//! Import resolution from Java import statements to entities of the same
//! project.
//!
//! Resolution is by fully-qualified name, so it runs in two passes: the
//! first annotates every entity with `packageName` / `fullClassName`, the
//! second re-reads the entities and links each non-wildcard import to the
//! entity carrying that name.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::GraphResult;
use crate::indexer::parser::parse_java;
use crate::indexer::{parallel_map, project_entities};
use crate::models::{
    edge_props, props, ClassEntity, GraphNode, NodeId, ENTITY_LABEL, IMPORTS, KIND_CLASS,
    PROP_FULL_CLASS_NAME, PROP_PACKAGE_NAME, PROP_PROJECT_ID,
};
use crate::store::{ensure_edge, prune_edges, GraphStore};

/// An entity whose source could not be parsed; it is skipped for the pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParseFailure {
    pub entity_id: NodeId,
    pub message: String,
}

/// An import name carried by more than one entity of the project.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AmbiguousImport {
    pub importer_id: NodeId,
    pub import_name: String,
    /// Candidate entity ids in ascending order.
    pub candidates: Vec<NodeId>,
    pub chosen: NodeId,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnnotateStats {
    pub entities: usize,
    pub annotated: usize,
    pub failures: Vec<ParseFailure>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResolveStats {
    pub imports_created: usize,
    pub already_present: usize,
    /// Edges whose import no longer appears in the importer's source.
    pub stale_removed: usize,
    pub unresolved: usize,
    pub self_imports: usize,
    pub ambiguous: Vec<AmbiguousImport>,
    pub failures: Vec<ParseFailure>,
}

/// Pass 1: write `packageName` and `fullClassName` onto every entity.
///
/// `fullClassName` is the qualified name of the declared type whose simple
/// name equals the entity's `name`, or `""` when no declaration matches.
pub fn annotate_entities<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    workers: usize,
) -> GraphResult<AnnotateStats> {
    let entities: Vec<ClassEntity> = project_entities(store, project_id)?
        .iter()
        .map(ClassEntity::from_node)
        .collect();

    let parsed = parallel_map(&entities, workers, |entity| {
        parse_java(&entity.content).map(|unit| {
            (
                unit.package_name.clone().unwrap_or_default(),
                unit.full_name_of(&entity.name),
            )
        })
    });

    let mut stats = AnnotateStats {
        entities: entities.len(),
        ..AnnotateStats::default()
    };
    for (entity, result) in entities.iter().zip(parsed) {
        match result {
            Ok((package_name, full_class_name)) => {
                store.update_node(
                    entity.id,
                    props(serde_json::json!({
                        PROP_PACKAGE_NAME: package_name,
                        PROP_FULL_CLASS_NAME: full_class_name,
                    })),
                )?;
                stats.annotated += 1;
            }
            Err(e) => {
                warn!("Error parsing entity {}: {}", entity.id, e);
                stats.failures.push(ParseFailure {
                    entity_id: entity.id,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        project_id,
        annotated = stats.annotated,
        failures = stats.failures.len(),
        "Entities annotated"
    );
    Ok(stats)
}

/// Entities of the project whose `fullClassName` equals `name`, by id.
fn candidates_for<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    name: &str,
) -> GraphResult<Vec<GraphNode>> {
    let filter = props(serde_json::json!({
        PROP_PROJECT_ID: project_id,
        PROP_FULL_CLASS_NAME: name,
    }));
    let mut nodes = store.find_nodes(ENTITY_LABEL, &filter)?;
    nodes.sort_by_key(|n| n.id);
    Ok(nodes)
}

/// Pass 2: create one `IMPORTS` edge per distinct resolved import and drop
/// this plugin's edges for imports the source no longer has.
///
/// Unresolved imports (library types) are skipped. An entity that fails to
/// parse keeps its existing edges. When several entities
/// carry the imported name the lowest id wins and the ambiguity is
/// reported.
pub fn link_imports<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
    workers: usize,
) -> GraphResult<ResolveStats> {
    let nodes = project_entities(store, project_id)?;
    let parsed = parallel_map(&nodes, workers, |node| {
        let content = ClassEntity::from_node(node).content;
        parse_java(&content).map(|unit| {
            unit.single_type_imports()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
    });

    let mut stats = ResolveStats::default();
    let mut lookup: HashMap<String, Vec<GraphNode>> = HashMap::new();

    for (node, result) in nodes.iter().zip(parsed) {
        let import_names = match result {
            Ok(names) => names,
            Err(e) => {
                warn!("Error parsing entity {}: {}", node.id, e);
                stats.failures.push(ParseFailure {
                    entity_id: node.id,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut targets: Vec<NodeId> = Vec::new();
        for name in import_names {
            if !seen.insert(name.clone()) {
                continue;
            }
            if !lookup.contains_key(&name) {
                let found = candidates_for(store, project_id, &name)?;
                lookup.insert(name.clone(), found);
            }
            let candidates = &lookup[&name];

            let Some(target) = candidates.first() else {
                debug!("Import {} of entity {} is unresolved", name, node.id);
                stats.unresolved += 1;
                continue;
            };
            if candidates.len() > 1 {
                warn!(
                    "Found {} entities for import {}; using the first one (id {})",
                    candidates.len(),
                    name,
                    target.id
                );
                stats.ambiguous.push(AmbiguousImport {
                    importer_id: node.id,
                    import_name: name.clone(),
                    candidates: candidates.iter().map(|c| c.id).collect(),
                    chosen: target.id,
                });
            }
            if target.id == node.id {
                debug!("Entity {} imports itself via {}", node.id, name);
                stats.self_imports += 1;
                continue;
            }

            targets.push(target.id);
            if ensure_edge(
                store,
                node,
                target,
                IMPORTS,
                edge_props(project_id, plugin_id, KIND_CLASS),
            )? {
                stats.imports_created += 1;
            } else {
                stats.already_present += 1;
            }
        }

        let owner = edge_props(project_id, plugin_id, KIND_CLASS);
        stats.stale_removed += prune_edges(store, node, IMPORTS, &owner, &targets)?;
    }

    info!(
        project_id,
        created = stats.imports_created,
        stale_removed = stats.stale_removed,
        unresolved = stats.unresolved,
        ambiguous = stats.ambiguous.len(),
        "Imports resolved"
    );
    Ok(stats)
}

/// Both passes, in order.
pub fn resolve_imports<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
    workers: usize,
) -> GraphResult<(AnnotateStats, ResolveStats)> {
    let annotated = annotate_entities(store, project_id, workers)?;
    let resolved = link_imports(store, project_id, plugin_id, workers)?;
    Ok((annotated, resolved))
}
