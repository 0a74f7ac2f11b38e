//! Shared typed models used across the store, indexer, and query layers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Labels, property keys, edge kinds
// ---------------------------------------------------------------------------

pub const ENTITY_LABEL: &str = "Entity";
pub const PACKAGE_LABEL: &str = "Package";

pub const IN_PACKAGE: &str = "IN_PACKAGE";
pub const IMPORTS: &str = "IMPORTS";
pub const PACKAGE_IMPORTS: &str = "PACKAGE_IMPORTS";

/// `IN_PACKAGE` between two packages, and `PACKAGE_IMPORTS`.
pub const KIND_PACKAGE: &str = "package";
/// `IN_PACKAGE` from a class to its package.
pub const KIND_CLASS_PACKAGE: &str = "class-package";
/// `IMPORTS` between two classes.
pub const KIND_CLASS: &str = "class";

pub const PROP_PROJECT_ID: &str = "projectId";
pub const PROP_PLUGIN_ID: &str = "pluginId";
pub const PROP_KIND: &str = "kind";
pub const PROP_NAME: &str = "name";
pub const PROP_CONTENT: &str = "content";
pub const PROP_PACKAGE_NAME: &str = "packageName";
pub const PROP_FULL_CLASS_NAME: &str = "fullClassName";
pub const PROP_LINES_OF_CODE: &str = "linesOfCode";
pub const PROP_PAGERANK: &str = "pagerank";
pub const PROP_QUALITY: &str = "quality";

pub type NodeId = i64;
pub type Properties = Map<String, Value>;

/// Turn a `json!({...})` literal into a property map. Non-object values
/// yield an empty map.
pub fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

// ---------------------------------------------------------------------------
// Raw graph records
// ---------------------------------------------------------------------------

/// A node as stored in the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub label: String,
    pub properties: Properties,
}

impl GraphNode {
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn i64_prop(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(Value::as_i64)
    }

    pub fn f64_prop(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }
}

/// A directed edge with both endpoints materialised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: i64,
    pub label: String,
    pub start: GraphNode,
    pub end: GraphNode,
    pub properties: Properties,
}

impl GraphEdge {
    pub fn kind(&self) -> Option<&str> {
        self.properties.get(PROP_KIND).and_then(Value::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeDirection {
    Incoming,
    Outgoing,
}

/// Common properties carried by every edge the core creates.
pub fn edge_props(project_id: &str, plugin_id: &str, kind: &str) -> Properties {
    props(serde_json::json!({
        PROP_PROJECT_ID: project_id,
        PROP_PLUGIN_ID: plugin_id,
        PROP_KIND: kind,
    }))
}

// ---------------------------------------------------------------------------
// Typed views
// ---------------------------------------------------------------------------

/// One parsed source type stored as an `Entity` node.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassEntity {
    pub id: NodeId,
    pub project_id: String,
    pub name: String,
    pub content: String,
    pub package_name: Option<String>,
    pub full_class_name: Option<String>,
    pub lines_of_code: Option<i64>,
}

impl ClassEntity {
    pub fn from_node(node: &GraphNode) -> Self {
        Self {
            id: node.id,
            project_id: node.str_prop(PROP_PROJECT_ID).unwrap_or_default().to_string(),
            name: node.str_prop(PROP_NAME).unwrap_or_default().to_string(),
            content: node.str_prop(PROP_CONTENT).unwrap_or_default().to_string(),
            package_name: node.str_prop(PROP_PACKAGE_NAME).map(str::to_string),
            full_class_name: node.str_prop(PROP_FULL_CLASS_NAME).map(str::to_string),
            lines_of_code: node.i64_prop(PROP_LINES_OF_CODE),
        }
    }

    /// Package the entity belongs to; unannotated entities live in the root
    /// package `""`.
    pub fn package_or_root(&self) -> &str {
        self.package_name.as_deref().unwrap_or("")
    }
}

/// One distinct package name observed among a project's classes.
#[derive(Clone, Debug, PartialEq)]
pub struct PackageNode {
    pub id: NodeId,
    pub project_id: String,
    pub name: String,
    pub pagerank: Option<f64>,
    pub quality: Option<i64>,
}

impl PackageNode {
    pub fn from_node(node: &GraphNode) -> Self {
        Self {
            id: node.id,
            project_id: node.str_prop(PROP_PROJECT_ID).unwrap_or_default().to_string(),
            name: node.str_prop(PROP_NAME).unwrap_or_default().to_string(),
            pagerank: node.f64_prop(PROP_PAGERANK),
            quality: node.i64_prop(PROP_QUALITY),
        }
    }
}

/// Parent package name: everything before the last `.`, or `""` for
/// top-level names. The root package itself has no parent.
pub fn parent_package_name(name: &str) -> Option<&str> {
    if name.is_empty() {
        return None;
    }
    Some(name.rfind('.').map_or("", |idx| &name[..idx]))
}
