//! Size metrics: lines of code per class and mean class size per package.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::errors::GraphResult;
use crate::indexer::{parallel_map, project_entities};
use crate::models::{
    props, ClassEntity, EdgeDirection, IN_PACKAGE, KIND_CLASS_PACKAGE, PACKAGE_LABEL,
    PROP_LINES_OF_CODE, PROP_PLUGIN_ID, PROP_PROJECT_ID, PROP_QUALITY,
};
use crate::store::GraphStore;

static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n|\r|\n").unwrap());

/// Number of lines in `content`, accepting `\n`, `\r\n` and `\r` breaks.
/// Trailing empty lines are not counted, so `"a\n"` has one line and `""`
/// has none.
pub fn count_lines(content: &str) -> i64 {
    let segments: Vec<&str> = LINE_BREAK_RE.split(content).collect();
    let kept = segments
        .iter()
        .rposition(|segment| !segment.is_empty())
        .map_or(0, |last| last + 1);
    kept as i64
}

/// Write `linesOfCode` onto every entity of the project. Returns the number
/// of entities updated.
pub fn annotate_lines_of_code<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    workers: usize,
) -> GraphResult<usize> {
    let entities: Vec<ClassEntity> = project_entities(store, project_id)?
        .iter()
        .map(ClassEntity::from_node)
        .collect();
    let counts = parallel_map(&entities, workers, |entity| count_lines(&entity.content));

    for (entity, lines) in entities.iter().zip(&counts) {
        store.update_node(entity.id, props(json!({ PROP_LINES_OF_CODE: lines })))?;
    }
    info!(project_id, entities = entities.len(), "Lines of code annotated");
    Ok(entities.len())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QualityStats {
    pub packages_scored: usize,
    pub packages_without_classes: usize,
}

/// Set each package's `quality` to the truncated mean `linesOfCode` of the
/// classes linked to it. Entities without `linesOfCode` count as 0 lines.
/// Packages with no classes keep `quality` unset.
pub fn compute_quality<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    plugin_id: &str,
) -> GraphResult<QualityStats> {
    let filter = props(json!({ PROP_PROJECT_ID: project_id, PROP_PLUGIN_ID: plugin_id }));
    let mut stats = QualityStats::default();

    for package in store.find_nodes(PACKAGE_LABEL, &filter)? {
        let sizes: Vec<i64> = store
            .get_edges(&package, IN_PACKAGE, EdgeDirection::Incoming)?
            .iter()
            .filter(|edge| edge.kind() == Some(KIND_CLASS_PACKAGE))
            .map(|edge| edge.start.i64_prop(PROP_LINES_OF_CODE).unwrap_or(0))
            .collect();
        if sizes.is_empty() {
            debug!("Package {} has no classes; quality left unset", package.id);
            stats.packages_without_classes += 1;
            continue;
        }
        let quality = sizes.iter().sum::<i64>() / sizes.len() as i64;
        store.update_node(package.id, props(json!({ PROP_QUALITY: quality })))?;
        stats.packages_scored += 1;
    }

    info!(project_id, scored = stats.packages_scored, "Package quality computed");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::packages::{build_package_hierarchy, link_classes_to_packages};
    use crate::models::{PackageNode, PROP_NAME};
    use crate::store::SqliteGraphStore;
    use crate::test_support::{add_annotated_entity, add_entity, reload, PLUGIN, PROJECT};

    #[test]
    fn line_counts_follow_every_break_style() {
        assert_eq!(count_lines(""), 0);
        assert_eq!(count_lines("a"), 1);
        assert_eq!(count_lines("a\n"), 1);
        assert_eq!(count_lines("a\nb\r\nc"), 3);
        assert_eq!(count_lines("a\rb\r"), 2);
        assert_eq!(count_lines("a\n\nb"), 3);
        assert_eq!(count_lines("a\n\n\n"), 1);
        assert_eq!(count_lines("\n\n"), 0);
    }

    #[test]
    fn annotation_writes_line_counts() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let a = add_entity(&store, "A", "class A {\n}\n");
        let b = add_entity(&store, "B", "");

        assert_eq!(annotate_lines_of_code(&store, PROJECT, 2).unwrap(), 2);
        assert_eq!(reload(&store, a.id).i64_prop(PROP_LINES_OF_CODE), Some(2));
        assert_eq!(reload(&store, b.id).i64_prop(PROP_LINES_OF_CODE), Some(0));
    }

    fn set_loc(store: &SqliteGraphStore, id: i64, lines: i64) {
        store
            .update_node(id, props(json!({ PROP_LINES_OF_CODE: lines })))
            .unwrap();
    }

    fn quality_of(store: &SqliteGraphStore, name: &str) -> Option<i64> {
        store
            .find_nodes(PACKAGE_LABEL, &props(json!({ PROP_NAME: name })))
            .unwrap()
            .iter()
            .map(PackageNode::from_node)
            .next()
            .and_then(|p| p.quality)
    }

    #[test]
    fn quality_is_truncated_mean_of_class_sizes() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        for (name, lines) in [("A", 10), ("B", 11), ("C", 11)] {
            let node = add_annotated_entity(&store, name, "com.a");
            set_loc(&store, node.id, lines);
        }
        let d = add_annotated_entity(&store, "D", "com.a.b");
        set_loc(&store, d.id, 7);

        let (index, _) = build_package_hierarchy(&store, PROJECT, PLUGIN, false).unwrap();
        link_classes_to_packages(&store, PROJECT, PLUGIN, &index).unwrap();
        let stats = compute_quality(&store, PROJECT, PLUGIN).unwrap();

        assert_eq!(stats.packages_scored, 2);
        // containment edge from com.a.b does not count toward com.a
        assert_eq!(quality_of(&store, "com.a"), Some(10));
        assert_eq!(quality_of(&store, "com.a.b"), Some(7));
    }

    #[test]
    fn missing_line_counts_are_zero() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let a = add_annotated_entity(&store, "A", "x");
        set_loc(&store, a.id, 9);
        add_annotated_entity(&store, "B", "x");

        let (index, _) = build_package_hierarchy(&store, PROJECT, PLUGIN, false).unwrap();
        link_classes_to_packages(&store, PROJECT, PLUGIN, &index).unwrap();
        compute_quality(&store, PROJECT, PLUGIN).unwrap();
        assert_eq!(quality_of(&store, "x"), Some(4));
    }

    #[test]
    fn package_without_classes_keeps_quality_unset() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        add_annotated_entity(&store, "C", "com.a.b");
        let (index, _) = build_package_hierarchy(&store, PROJECT, PLUGIN, true).unwrap();
        link_classes_to_packages(&store, PROJECT, PLUGIN, &index).unwrap();

        let stats = compute_quality(&store, PROJECT, PLUGIN).unwrap();
        assert_eq!(stats.packages_scored, 1);
        assert_eq!(stats.packages_without_classes, 2);
        assert_eq!(quality_of(&store, "com"), None);
        assert_eq!(quality_of(&store, "com.a.b"), Some(0));
    }
}
