//! Lift class-level `IMPORTS` edges to package-level `PACKAGE_IMPORTS`.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::errors::GraphResult;
use crate::models::props;
use crate::store::GraphStore;

/// Insert one `PACKAGE_IMPORTS` edge per ordered pair of distinct packages
/// of the project where some class of the first imports some class of the
/// second. Pairs that are already connected are left alone, and imports
/// between classes of the same package produce nothing.
const AGGREGATE_PACKAGE_IMPORTS: &str = "\
INSERT INTO edges (source_id, target_id, label, properties)
SELECT DISTINCT src_pkg.id, dst_pkg.id, 'PACKAGE_IMPORTS',
       json_object('projectId', :project_id, 'pluginId', :plugin_id, 'kind', 'package')
FROM edges imp
JOIN nodes importer ON importer.id = imp.source_id
JOIN edges src_link
  ON src_link.source_id = imp.source_id
 AND src_link.label = 'IN_PACKAGE'
 AND json_extract(src_link.properties, '$.\"kind\"') = 'class-package'
JOIN nodes src_pkg
  ON src_pkg.id = src_link.target_id
 AND src_pkg.label = 'Package'
 AND json_extract(src_pkg.properties, '$.\"projectId\"') = :project_id
 AND json_extract(src_pkg.properties, '$.\"pluginId\"') = :plugin_id
JOIN edges dst_link
  ON dst_link.source_id = imp.target_id
 AND dst_link.label = 'IN_PACKAGE'
 AND json_extract(dst_link.properties, '$.\"kind\"') = 'class-package'
JOIN nodes dst_pkg
  ON dst_pkg.id = dst_link.target_id
 AND dst_pkg.label = 'Package'
 AND json_extract(dst_pkg.properties, '$.\"projectId\"') = :project_id
 AND json_extract(dst_pkg.properties, '$.\"pluginId\"') = :plugin_id
WHERE imp.label = 'IMPORTS'
  AND json_extract(importer.properties, '$.\"projectId\"') = :project_id
  AND src_pkg.id <> dst_pkg.id
  AND NOT EXISTS (
      SELECT 1 FROM edges existing
      WHERE existing.source_id = src_pkg.id
        AND existing.target_id = dst_pkg.id
        AND existing.label = 'PACKAGE_IMPORTS')
RETURNING source_id, target_id";

/// Remove this plugin's `PACKAGE_IMPORTS` edges of the project that no class
/// import between the two packages supports any more.
const PRUNE_PACKAGE_IMPORTS: &str = "\
DELETE FROM edges
WHERE label = 'PACKAGE_IMPORTS'
  AND json_extract(properties, '$.\"projectId\"') = :project_id
  AND json_extract(properties, '$.\"pluginId\"') = :plugin_id
  AND NOT EXISTS (
      SELECT 1
      FROM edges imp
      JOIN edges src_link
        ON src_link.source_id = imp.source_id
       AND src_link.label = 'IN_PACKAGE'
       AND json_extract(src_link.properties, '$.\"kind\"') = 'class-package'
      JOIN edges dst_link
        ON dst_link.source_id = imp.target_id
       AND dst_link.label = 'IN_PACKAGE'
       AND json_extract(dst_link.properties, '$.\"kind\"') = 'class-package'
      WHERE imp.label = 'IMPORTS'
        AND src_link.target_id = edges.source_id
        AND dst_link.target_id = edges.target_id)
RETURNING id";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub created: usize,
    pub stale_removed: usize,
}

/// Drop unsupported package imports, then merge the current ones.
pub fn aggregate_package_imports<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
) -> GraphResult<AggregateStats> {
    let params = props(json!({ "project_id": project_id, "plugin_id": plugin_id }));
    let removed = store.execute_query(PRUNE_PACKAGE_IMPORTS, &params)?;
    let created = store.execute_query(AGGREGATE_PACKAGE_IMPORTS, &params)?;
    let stats = AggregateStats {
        created: created.len(),
        stale_removed: removed.len(),
    };
    info!(
        project_id,
        created = stats.created,
        stale_removed = stats.stale_removed,
        "Package imports aggregated"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::packages::{build_package_hierarchy, link_classes_to_packages, PackageIndex};
    use crate::models::{
        edge_props, EdgeDirection, GraphNode, IMPORTS, KIND_CLASS, KIND_PACKAGE, PACKAGE_IMPORTS,
        PROP_NAME, PROP_PLUGIN_ID,
    };
    use crate::store::{ensure_edge, SqliteGraphStore};
    use crate::test_support::{add_annotated_entity, PLUGIN, PROJECT};

    fn import(store: &SqliteGraphStore, from: &GraphNode, to: &GraphNode) {
        ensure_edge(store, from, to, IMPORTS, edge_props(PROJECT, PLUGIN, KIND_CLASS)).unwrap();
    }

    fn packaged(store: &SqliteGraphStore) -> PackageIndex {
        let (index, _) = build_package_hierarchy(store, PROJECT, PLUGIN, false).unwrap();
        link_classes_to_packages(store, PROJECT, PLUGIN, &index).unwrap();
        index
    }

    fn imported_packages(store: &SqliteGraphStore, index: &PackageIndex, name: &str) -> Vec<String> {
        store
            .get_edges(index.get(name).unwrap(), PACKAGE_IMPORTS, EdgeDirection::Outgoing)
            .unwrap()
            .iter()
            .map(|e| e.end.str_prop(PROP_NAME).unwrap().to_string())
            .collect()
    }

    #[test]
    fn class_imports_become_one_package_edge_per_pair() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let foo = add_annotated_entity(&store, "Foo", "com.a");
        let baz = add_annotated_entity(&store, "Baz", "com.a");
        let bar = add_annotated_entity(&store, "Bar", "com.b");
        let qux = add_annotated_entity(&store, "Qux", "com.b");
        import(&store, &foo, &bar);
        import(&store, &baz, &qux);
        import(&store, &foo, &baz);
        let index = packaged(&store);

        assert_eq!(aggregate_package_imports(&store, PROJECT, PLUGIN).unwrap().created, 1);
        assert_eq!(imported_packages(&store, &index, "com.a"), vec!["com.b"]);
        assert!(imported_packages(&store, &index, "com.b").is_empty());

        let edge = &store
            .get_edges(index.get("com.a").unwrap(), PACKAGE_IMPORTS, EdgeDirection::Outgoing)
            .unwrap()[0];
        assert_eq!(edge.kind(), Some(KIND_PACKAGE));
        assert_eq!(edge.properties[PROP_PLUGIN_ID], PLUGIN);
    }

    #[test]
    fn rerun_creates_nothing() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let foo = add_annotated_entity(&store, "Foo", "com.a");
        let bar = add_annotated_entity(&store, "Bar", "com.b");
        import(&store, &foo, &bar);
        import(&store, &bar, &foo);
        let index = packaged(&store);

        assert_eq!(aggregate_package_imports(&store, PROJECT, PLUGIN).unwrap().created, 2);
        assert_eq!(aggregate_package_imports(&store, PROJECT, PLUGIN).unwrap().created, 0);
        assert_eq!(imported_packages(&store, &index, "com.a"), vec!["com.b"]);
        assert_eq!(imported_packages(&store, &index, "com.b"), vec!["com.a"]);
    }

    #[test]
    fn imports_within_a_package_are_ignored() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let foo = add_annotated_entity(&store, "Foo", "com.a");
        let baz = add_annotated_entity(&store, "Baz", "com.a");
        import(&store, &foo, &baz);
        packaged(&store);

        assert_eq!(aggregate_package_imports(&store, PROJECT, PLUGIN).unwrap().created, 0);
    }

    #[test]
    fn other_projects_are_untouched() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let foo = add_annotated_entity(&store, "Foo", "com.a");
        let bar = add_annotated_entity(&store, "Bar", "com.b");
        import(&store, &foo, &bar);
        packaged(&store);

        assert_eq!(aggregate_package_imports(&store, "elsewhere", PLUGIN).unwrap().created, 0);
        assert_eq!(aggregate_package_imports(&store, PROJECT, "other-plugin").unwrap().created, 0);
        assert_eq!(aggregate_package_imports(&store, PROJECT, PLUGIN).unwrap().created, 1);
    }

    #[test]
    fn unsupported_package_import_is_removed() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let foo = add_annotated_entity(&store, "Foo", "com.a");
        let bar = add_annotated_entity(&store, "Bar", "com.b");
        import(&store, &foo, &bar);
        let index = packaged(&store);
        aggregate_package_imports(&store, PROJECT, PLUGIN).unwrap();

        let class_import = store.get_edges(&foo, IMPORTS, EdgeDirection::Outgoing).unwrap();
        store.delete_edge(class_import[0].id).unwrap();

        assert_eq!(aggregate_package_imports(&store, "elsewhere", PLUGIN).unwrap().stale_removed, 0);
        let stats = aggregate_package_imports(&store, PROJECT, PLUGIN).unwrap();
        assert_eq!(stats, AggregateStats { created: 0, stale_removed: 1 });
        assert!(imported_packages(&store, &index, "com.a").is_empty());
    }
}
