//! SQLite property-graph storage layer.
//!
//! Nodes and edges keep their properties as JSON documents; filters and
//! merges use SQLite's built-in JSON functions. A single connection is held
//! behind a mutex so in-memory databases and temporary state survive across
//! calls.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::errors::{GraphError, GraphResult};
use crate::models::{EdgeDirection, GraphEdge, GraphNode, NodeId, Properties};
use crate::store::graph::GraphStore;
use crate::store::schema;

// ---------------------------------------------------------------------------
// Helper: home-relative paths
// ---------------------------------------------------------------------------

/// `~` and `~/...` resolve against `$HOME`; other paths are returned as given.
fn resolve_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) if rest.as_os_str().is_empty() => PathBuf::from(home),
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Helper: JSON <-> SQLite value conversion
// ---------------------------------------------------------------------------

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

/// JSON path selecting a top-level property, e.g. `$."projectId"`.
fn property_path(key: &str) -> GraphResult<String> {
    if key.is_empty() || key.contains('"') {
        return Err(GraphError::Query(format!("invalid property key: {key:?}")));
    }
    Ok(format!("$.\"{key}\""))
}

fn parse_properties(raw: &str) -> GraphResult<Properties> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Properties::new()),
    }
}

/// Read a node from three consecutive columns starting at `offset`
/// (`id`, `label`, `properties`).
fn node_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<(NodeId, String, String)> {
    Ok((row.get(offset)?, row.get(offset + 1)?, row.get(offset + 2)?))
}

fn build_node((id, label, raw): (NodeId, String, String)) -> GraphResult<GraphNode> {
    Ok(GraphNode {
        id,
        label,
        properties: parse_properties(&raw)?,
    })
}

// ---------------------------------------------------------------------------
// SqliteGraphStore
// ---------------------------------------------------------------------------

/// Embedded SQLite graph store.
pub struct SqliteGraphStore {
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open (or create) a database file. The path is expanded and parent
    /// directories are created if they do not already exist.
    pub fn open(db_path: impl AsRef<Path>) -> GraphResult<Self> {
        let expanded = resolve_home(db_path.as_ref());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&resolved)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        let store = Self {
            db_path: Some(resolved),
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> GraphResult<Self> {
        let store = Self {
            db_path: None,
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Resolved database path; `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Create all tables and indexes, then run pending migrations.
    fn init_schema(&self) -> GraphResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(&conn)?;
        Ok(())
    }

    fn load_node(conn: &Connection, id: NodeId) -> GraphResult<GraphNode> {
        let row = conn
            .query_row(
                "SELECT id, label, properties FROM nodes WHERE id = ?1;",
                params![id],
                |row| node_from_row(row, 0),
            )
            .optional()?;
        match row {
            Some(parts) => build_node(parts),
            None => Err(GraphError::NodeNotFound(id)),
        }
    }
}

impl GraphStore for SqliteGraphStore {
    fn create_node(&self, label: &str, properties: Properties) -> GraphResult<GraphNode> {
        let conn = self.conn.lock();
        let raw = serde_json::to_string(&properties)?;
        conn.execute(
            "INSERT INTO nodes (label, properties) VALUES (?1, ?2);",
            params![label, raw],
        )?;
        Ok(GraphNode {
            id: conn.last_insert_rowid(),
            label: label.to_string(),
            properties,
        })
    }

    fn find_nodes(&self, label: &str, filter: &Properties) -> GraphResult<Vec<GraphNode>> {
        let mut sql = String::from("SELECT id, label, properties FROM nodes WHERE label = ?1");
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(label.to_string())];
        for (key, value) in filter {
            values.push(SqlValue::Text(property_path(key)?));
            let path_index = values.len();
            values.push(json_to_sql(value));
            let value_index = values.len();
            sql.push_str(&format!(
                " AND json_extract(properties, ?{path_index}) IS ?{value_index}"
            ));
        }
        sql.push_str(" ORDER BY id;");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(NodeId, String, String)> = stmt
            .query_map(params_from_iter(values.iter()), |row| node_from_row(row, 0))?
            .collect::<Result<_, _>>()?;
        rows.into_iter().map(build_node).collect()
    }

    fn update_node(&self, id: NodeId, properties: Properties) -> GraphResult<()> {
        let conn = self.conn.lock();
        let patch = serde_json::to_string(&properties)?;
        let changed = conn.execute(
            "UPDATE nodes SET properties = json_patch(properties, ?2) WHERE id = ?1;",
            params![id, patch],
        )?;
        if changed == 0 {
            return Err(GraphError::NodeNotFound(id));
        }
        Ok(())
    }

    fn get_edges(
        &self,
        node: &GraphNode,
        label: &str,
        direction: EdgeDirection,
    ) -> GraphResult<Vec<GraphEdge>> {
        let anchor = match direction {
            EdgeDirection::Outgoing => "e.source_id",
            EdgeDirection::Incoming => "e.target_id",
        };
        let sql = format!(
            "SELECT e.id, e.label, e.properties, \
                    s.id, s.label, s.properties, \
                    t.id, t.label, t.properties \
             FROM edges e \
             JOIN nodes s ON s.id = e.source_id \
             JOIN nodes t ON t.id = e.target_id \
             WHERE {anchor} = ?1 AND e.label = ?2 \
             ORDER BY e.id;"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<_> = stmt
            .query_map(params![node.id, label], |row| {
                Ok((
                    node_from_row(row, 0)?,
                    node_from_row(row, 3)?,
                    node_from_row(row, 6)?,
                ))
            })?
            .collect::<Result<_, _>>()?;

        rows.into_iter()
            .map(|((id, label, raw), start, end)| {
                Ok(GraphEdge {
                    id,
                    label,
                    start: build_node(start)?,
                    end: build_node(end)?,
                    properties: parse_properties(&raw)?,
                })
            })
            .collect()
    }

    fn create_edge(
        &self,
        from: &GraphNode,
        to: &GraphNode,
        label: &str,
        properties: Properties,
    ) -> GraphResult<GraphEdge> {
        let conn = self.conn.lock();
        let raw = serde_json::to_string(&properties)?;
        conn.execute(
            "INSERT INTO edges (source_id, target_id, label, properties) \
             VALUES (?1, ?2, ?3, ?4);",
            params![from.id, to.id, label, raw],
        )?;
        let id = conn.last_insert_rowid();
        Ok(GraphEdge {
            id,
            label: label.to_string(),
            start: Self::load_node(&conn, from.id)?,
            end: Self::load_node(&conn, to.id)?,
            properties,
        })
    }

    fn delete_edge(&self, id: i64) -> GraphResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM edges WHERE id = ?1;", params![id])?;
        if changed == 0 {
            return Err(GraphError::Store(format!("edge {id} not found")));
        }
        Ok(())
    }

    fn execute_query(&self, query: &str, parameters: &Properties) -> GraphResult<Vec<Properties>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(query)?;

        let names: Vec<Option<String>> = (1..=stmt.parameter_count())
            .map(|index| stmt.parameter_name(index).map(str::to_string))
            .collect();
        for (offset, name) in names.iter().enumerate() {
            let name = name.as_deref().ok_or_else(|| {
                GraphError::Query("positional parameters are not supported".to_string())
            })?;
            let key = name.trim_start_matches([':', '@', '$']);
            let value = parameters
                .get(key)
                .ok_or_else(|| GraphError::Query(format!("missing query parameter: {key}")))?;
            stmt.raw_bind_parameter(offset + 1, json_to_sql(value))?;
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Properties::new();
            for (index, column) in columns.iter().enumerate() {
                record.insert(column.clone(), sql_to_json(row.get_ref(index)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}
