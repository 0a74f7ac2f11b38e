//! Fixtures shared by the unit tests.

use serde_json::json;

use crate::models::{props, GraphNode, NodeId, Properties, ENTITY_LABEL};
use crate::store::{GraphStore, SqliteGraphStore};

pub const PROJECT: &str = "p1";
pub const PLUGIN: &str = "package-metrics";

/// Entity node of [`PROJECT`] carrying `name` and Java `content` only.
pub fn add_entity<S: GraphStore + ?Sized>(store: &S, name: &str, content: &str) -> GraphNode {
    store
        .create_node(
            ENTITY_LABEL,
            props(json!({ "projectId": PROJECT, "name": name, "content": content })),
        )
        .unwrap()
}

/// Entity node that already carries the annotations written by import
/// resolution.
pub fn add_annotated_entity<S: GraphStore + ?Sized>(
    store: &S,
    name: &str,
    package: &str,
) -> GraphNode {
    let full_class_name = if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}.{name}")
    };
    store
        .create_node(
            ENTITY_LABEL,
            props(json!({
                "projectId": PROJECT,
                "name": name,
                "content": "",
                "packageName": package,
                "fullClassName": full_class_name,
            })),
        )
        .unwrap()
}

/// Java source of a class with `body_lines` field declarations.
pub fn java_class(package: &str, name: &str, imports: &[&str], body_lines: usize) -> String {
    let mut src = String::new();
    if !package.is_empty() {
        src.push_str(&format!("package {package};\n"));
    }
    for import in imports {
        src.push_str(&format!("import {import};\n"));
    }
    src.push_str(&format!("public class {name} {{\n"));
    for i in 0..body_lines {
        src.push_str(&format!("    int f{i};\n"));
    }
    src.push_str("}\n");
    src
}

/// Current state of a node.
pub fn reload(store: &SqliteGraphStore, id: NodeId) -> GraphNode {
    store
        .execute_query(
            "SELECT label, properties FROM nodes WHERE id = :id",
            &props(json!({ "id": id })),
        )
        .unwrap()
        .into_iter()
        .next()
        .map(|row| GraphNode {
            id,
            label: row["label"].as_str().unwrap().to_string(),
            properties: serde_json::from_str::<Properties>(row["properties"].as_str().unwrap())
                .unwrap(),
        })
        .unwrap()
}
