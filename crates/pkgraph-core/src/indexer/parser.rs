//! Java fact extraction backed by the native tree-sitter grammar.
//!
//! Produces the package declaration, top-level type declarations and import
//! statements of one compilation unit. A syntax error anywhere in the unit
//! fails the whole parse.

use tree_sitter::Node;

use crate::errors::{GraphError, GraphResult};

/// Kind of a top-level type declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Annotation,
}

impl TypeKind {
    fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "class_declaration" => Some(TypeKind::Class),
            "interface_declaration" => Some(TypeKind::Interface),
            "enum_declaration" => Some(TypeKind::Enum),
            "record_declaration" => Some(TypeKind::Record),
            "annotation_type_declaration" => Some(TypeKind::Annotation),
            _ => None,
        }
    }

    /// Classes and interfaces, the declarations the long-class report counts.
    pub fn is_class_or_interface(self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Interface)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredType {
    pub simple_name: String,
    pub fully_qualified_name: Option<String>,
    pub kind: TypeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportFact {
    /// Dotted name without a trailing `.*`.
    pub name: String,
    pub is_wildcard: bool,
    pub is_static: bool,
}

/// Facts extracted from one compilation unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedUnit {
    pub package_name: Option<String>,
    pub declared_types: Vec<DeclaredType>,
    pub imports: Vec<ImportFact>,
}

impl ParsedUnit {
    /// Fully-qualified name of the declared type whose simple name is
    /// `simple_name`, or `""` when there is no such declaration.
    pub fn full_name_of(&self, simple_name: &str) -> String {
        self.declared_types
            .iter()
            .find(|t| t.simple_name == simple_name)
            .and_then(|t| t.fully_qualified_name.clone())
            .unwrap_or_default()
    }

    /// Non-wildcard import names, in source order.
    pub fn single_type_imports(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .filter(|i| !i.is_wildcard)
            .map(|i| i.name.as_str())
    }
}

fn node_text<'a>(node: Node<'_>, source: &'a str) -> GraphResult<&'a str> {
    node.utf8_text(source.as_bytes())
        .map_err(|e| GraphError::Parse(format!("invalid UTF-8 in source: {e}")))
}

/// First `identifier` / `scoped_identifier` child, i.e. the dotted name of a
/// package or import declaration.
fn dotted_name<'a>(node: Node<'_>, source: &'a str) -> GraphResult<Option<&'a str>> {
    let mut cursor = node.walk();
    let name = node
        .named_children(&mut cursor)
        .find(|child| matches!(child.kind(), "identifier" | "scoped_identifier"));
    name.map(|n| node_text(n, source)).transpose()
}

/// Parse Java source text into a [`ParsedUnit`].
pub fn parse_java(source: &str) -> GraphResult<ParsedUnit> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .map_err(|e| GraphError::Parse(format!("Failed to set language: {e}")))?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| GraphError::Parse("parser returned no tree".to_string()))?;
    let root = tree.root_node();
    if root.has_error() {
        let position = first_error_position(root);
        return Err(GraphError::Parse(format!(
            "syntax error at line {}, column {}",
            position.row + 1,
            position.column + 1
        )));
    }

    let mut unit = ParsedUnit::default();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "package_declaration" => {
                unit.package_name = dotted_name(child, source)?.map(str::to_string);
            }
            "import_declaration" => {
                let Some(name) = dotted_name(child, source)? else {
                    continue;
                };
                let mut inner = child.walk();
                let mut is_wildcard = false;
                let mut is_static = false;
                for token in child.children(&mut inner) {
                    match token.kind() {
                        "asterisk" => is_wildcard = true,
                        "static" => is_static = true,
                        _ => {}
                    }
                }
                unit.imports.push(ImportFact {
                    name: name.to_string(),
                    is_wildcard,
                    is_static,
                });
            }
            other => {
                let Some(kind) = TypeKind::from_node_kind(other) else {
                    continue;
                };
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let simple_name = node_text(name_node, source)?.to_string();
                let fully_qualified_name = Some(match &unit.package_name {
                    Some(pkg) => format!("{pkg}.{simple_name}"),
                    None => simple_name.clone(),
                });
                unit.declared_types.push(DeclaredType {
                    simple_name,
                    fully_qualified_name,
                    kind,
                });
            }
        }
    }

    Ok(unit)
}

fn first_error_position(node: Node<'_>) -> tree_sitter::Point {
    if node.is_error() || node.is_missing() {
        return node.start_position();
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            return first_error_position(child);
        }
    }
    node.start_position()
}
