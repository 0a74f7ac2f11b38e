//! Report of classes whose source exceeds a line threshold.

use serde::Serialize;
use tracing::warn;

use crate::errors::GraphResult;
use crate::indexer::metrics::count_lines;
use crate::indexer::parser::parse_java;
use crate::indexer::project_entities;
use crate::models::ClassEntity;
use crate::store::GraphStore;

pub const DEFAULT_LONG_CLASS_THRESHOLD: i64 = 1000;
/// Display name for the unnamed package, used in `packageName` only.
/// `fullName` stays the Java-qualified name: a root-package class `Big`
/// reports "Big", not "(root package).Big".
pub const ROOT_PACKAGE_LABEL: &str = "(root package)";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LongClass {
    pub name: String,
    #[serde(rename = "packageName")]
    pub package_name: String,
    #[serde(rename = "lineCount")]
    pub line_count: i64,
    #[serde(rename = "fullName")]
    pub full_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LongClassReport {
    pub threshold: i64,
    #[serde(rename = "totalClasses")]
    pub total_classes: usize,
    #[serde(rename = "longClasses")]
    pub long_classes: Vec<LongClass>,
    /// Share of long classes among all classes, 0-100.
    pub percentage: f64,
}

/// Every top-level class or interface of the project counts once; those in
/// a source longer than `threshold` lines are listed, longest first.
pub fn long_classes<S: GraphStore + ?Sized>(
    store: &S,
    project_id: &str,
    threshold: i64,
) -> GraphResult<LongClassReport> {
    let mut total_classes = 0;
    let mut long = Vec::new();

    for node in project_entities(store, project_id)? {
        let entity = ClassEntity::from_node(&node);
        if entity.content.is_empty() {
            continue;
        }
        let unit = match parse_java(&entity.content) {
            Ok(unit) => unit,
            Err(e) => {
                warn!("Error parsing entity {}: {}", entity.id, e);
                continue;
            }
        };
        let line_count = count_lines(&entity.content);
        for declared in unit.declared_types.iter().filter(|t| t.kind.is_class_or_interface()) {
            total_classes += 1;
            if line_count <= threshold {
                continue;
            }
            long.push(LongClass {
                name: declared.simple_name.clone(),
                package_name: unit
                    .package_name
                    .clone()
                    .unwrap_or_else(|| ROOT_PACKAGE_LABEL.to_string()),
                line_count,
                // not derived from package_name; see ROOT_PACKAGE_LABEL
                full_name: declared
                    .fully_qualified_name
                    .clone()
                    .unwrap_or_else(|| declared.simple_name.clone()),
            });
        }
    }

    long.sort_by(|a, b| b.line_count.cmp(&a.line_count));
    let percentage = if total_classes == 0 {
        0.0
    } else {
        long.len() as f64 / total_classes as f64 * 100.0
    };
    Ok(LongClassReport {
        threshold,
        total_classes,
        long_classes: long,
        percentage,
    })
}

#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(name = "long_classes", signature = (db_path, project_id, threshold=DEFAULT_LONG_CLASS_THRESHOLD))]
pub fn py_long_classes(db_path: &str, project_id: &str, threshold: i64) -> pyo3::PyResult<String> {
    let store = crate::store::SqliteGraphStore::open(db_path)?;
    let report = long_classes(&store, project_id, threshold)?;
    Ok(serde_json::to_string(&report).map_err(crate::errors::GraphError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteGraphStore;
    use crate::test_support::{add_entity, java_class, PROJECT};

    #[test]
    fn long_classes_sorted_longest_first() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        add_entity(&store, "Small", &java_class("a", "Small", &[], 1));
        add_entity(&store, "Mid", &java_class("a", "Mid", &[], 10));
        add_entity(&store, "Big", &java_class("", "Big", &[], 20));
        add_entity(&store, "Color", "package a;\nenum Color { RED }\n");
        add_entity(&store, "Empty", "");
        add_entity(&store, "Broken", "class Broken {");

        let report = long_classes(&store, PROJECT, 5).unwrap();
        assert_eq!(report.total_classes, 3);
        let names: Vec<&str> = report.long_classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Big", "Mid"]);
        assert_eq!(report.long_classes[0].package_name, ROOT_PACKAGE_LABEL);
        assert_eq!(report.long_classes[0].line_count, 22);
        assert_eq!(report.long_classes[0].full_name, "Big");
        assert_eq!(report.long_classes[1].full_name, "a.Mid");
        assert!((report.percentage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_is_exclusive() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        add_entity(&store, "Edge", &java_class("a", "Edge", &[], 3));
        let report = long_classes(&store, PROJECT, 6).unwrap();
        assert!(report.long_classes.is_empty());
        let report = long_classes(&store, PROJECT, 5).unwrap();
        assert_eq!(report.long_classes.len(), 1);
    }

    #[test]
    fn no_classes_means_zero_percent() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let report = long_classes(&store, PROJECT, DEFAULT_LONG_CLASS_THRESHOLD).unwrap();
        assert_eq!(report.total_classes, 0);
        assert_eq!(report.percentage, 0.0);
    }
}
