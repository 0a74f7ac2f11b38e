//! SQLite schema DDL and migration framework for the property graph.

use rusqlite::Connection;
use tracing::debug;

use crate::errors::GraphResult;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 2;

/// Core DDL statements: 7 CREATE TABLE + 5 CREATE INDEX.
///
/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables (7) ──────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS graph_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        label TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}'
    );",
    "CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER NOT NULL REFERENCES nodes(id),
        target_id INTEGER NOT NULL REFERENCES nodes(id),
        label TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}',
        CHECK (source_id <> target_id)
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS projections (
        name TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS projection_nodes (
        projection TEXT NOT NULL REFERENCES projections(name),
        node_id INTEGER NOT NULL,
        PRIMARY KEY(projection, node_id)
    );",
    "CREATE TABLE IF NOT EXISTS projection_edges (
        projection TEXT NOT NULL REFERENCES projections(name),
        source_id INTEGER NOT NULL,
        target_id INTEGER NOT NULL
    );",
    // ── indexes (5) ─────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_nodes_label_project \
     ON nodes(label, json_extract(properties, '$.\"projectId\"'));",
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id, label);",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id, label);",
    "CREATE INDEX IF NOT EXISTS idx_edges_label ON edges(label);",
    "CREATE INDEX IF NOT EXISTS idx_projection_edges ON projection_edges(projection);",
];

// ─── Migrations ─────────────────────────────────────────────────────────────

/// One schema upgrade. `version` is the version the database reports once
/// `apply` has succeeded.
struct Migration {
    version: i32,
    description: &'static str,
    apply: fn(&Connection) -> GraphResult<()>,
}

/// Ordered by `version`; the last entry's version is [`SCHEMA_VERSION`].
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "unique PACKAGE_IMPORTS per package pair",
        apply: unique_package_imports,
    },
    Migration {
        version: 2,
        description: "drop projections of interrupted runs",
        apply: clear_projections,
    },
];

/// Bring the database from its stored version up to [`SCHEMA_VERSION`].
///
/// Each migration runs inside its own savepoint and is logged to
/// `migration_history`, whether it succeeds or fails.
pub fn migrate_schema(conn: &Connection) -> GraphResult<()> {
    let from = get_schema_version(conn);
    let mut current = from;
    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        if let Err(e) = apply_in_savepoint(conn, current, migration) {
            log_migration(conn, current, migration.version, Err(e.to_string().as_str()))?;
            return Err(e);
        }
        current = migration.version;
    }
    Ok(())
}

fn apply_in_savepoint(conn: &Connection, from: i32, migration: &Migration) -> GraphResult<()> {
    conn.execute_batch("SAVEPOINT pkgraph_migration;")?;
    let applied = (migration.apply)(conn)
        .and_then(|()| store_schema_version(conn, migration.version))
        .and_then(|()| log_migration(conn, from, migration.version, Ok(())));
    match applied {
        Ok(()) => conn.execute_batch("RELEASE pkgraph_migration;")?,
        Err(e) => {
            conn.execute_batch("ROLLBACK TO pkgraph_migration; RELEASE pkgraph_migration;")?;
            return Err(e);
        }
    }
    debug!(
        "schema migrated {} -> {}: {}",
        from,
        migration.version,
        migration.description
    );
    Ok(())
}

/// Stored schema version; 0 for a database that has never been migrated.
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT CAST(value AS INTEGER) FROM graph_meta WHERE key = 'schema_version';",
        [],
        |row| row.get::<_, Option<i32>>(0),
    )
    .ok()
    .flatten()
    .unwrap_or(0)
}

fn store_schema_version(conn: &Connection, version: i32) -> GraphResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO graph_meta(key, value) VALUES ('schema_version', ?1);",
        [version.to_string()],
    )?;
    Ok(())
}

fn log_migration(
    conn: &Connection,
    from: i32,
    to: i32,
    outcome: Result<(), &str>,
) -> GraphResult<()> {
    let (status, error) = match outcome {
        Ok(()) => ("success", None),
        Err(message) => ("failed", Some(message)),
    };
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from, to, status, error],
    )?;
    Ok(())
}

/// Collapse duplicate `PACKAGE_IMPORTS` rows, keeping the oldest of each
/// pair, then forbid new ones.
fn unique_package_imports(conn: &Connection) -> GraphResult<()> {
    conn.execute_batch(
        "DELETE FROM edges WHERE label = 'PACKAGE_IMPORTS' AND id NOT IN ( \
             SELECT MIN(id) FROM edges WHERE label = 'PACKAGE_IMPORTS' \
             GROUP BY source_id, target_id); \
         CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_package_imports_pair \
             ON edges(source_id, target_id) WHERE label = 'PACKAGE_IMPORTS';",
    )?;
    Ok(())
}

fn clear_projections(conn: &Connection) -> GraphResult<()> {
    conn.execute_batch(
        "DELETE FROM projection_edges; DELETE FROM projection_nodes; DELETE FROM projections;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        conn
    }

    #[test]
    fn schema_statement_counts() {
        // 7 tables + 5 indexes
        assert_eq!(SCHEMA_STATEMENTS.len(), 12);
    }

    #[test]
    fn migrate_fresh_database() {
        let conn = fresh_connection();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let steps: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM migration_history WHERE status = 'success';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(steps, SCHEMA_VERSION as i64);
    }

    #[test]
    fn migrations_ascend_to_current_version() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.last(), Some(&SCHEMA_VERSION));
    }

    #[test]
    fn project_lookup_index_targets_project_id() {
        let conn = fresh_connection();
        let sql: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = 'idx_nodes_label_project';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(sql.contains(r#"'$."projectId"'"#));
    }

    #[test]
    fn partially_migrated_database_runs_remaining_steps_only() {
        let conn = fresh_connection();
        conn.execute_batch(
            "INSERT INTO graph_meta(key, value) VALUES ('schema_version', '1');
             INSERT INTO projections(name, project_id) VALUES ('package-importance:p1', 'p1');",
        )
        .unwrap();

        migrate_schema(&conn).unwrap();

        let (from, to): (i32, i32) = conn
            .query_row(
                "SELECT from_version, to_version FROM migration_history;",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((from, to), (1, 2));
        let projections: i64 = conn
            .query_row("SELECT COUNT(*) FROM projections;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(projections, 0);
    }

    #[test]
    fn migrate_idempotent() {
        let conn = fresh_connection();
        migrate_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn upgrade_collapses_duplicate_package_imports() {
        let conn = fresh_connection();
        conn.execute_batch(
            "INSERT INTO nodes(label) VALUES ('Package'), ('Package');
             INSERT INTO edges(source_id, target_id, label) VALUES (1, 2, 'PACKAGE_IMPORTS');
             INSERT INTO edges(source_id, target_id, label) VALUES (1, 2, 'PACKAGE_IMPORTS');",
        )
        .unwrap();

        migrate_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM edges;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let duplicate = conn.execute(
            "INSERT INTO edges(source_id, target_id, label) VALUES (1, 2, 'PACKAGE_IMPORTS');",
            [],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn self_loops_rejected() {
        let conn = fresh_connection();
        conn.execute_batch("INSERT INTO nodes(label) VALUES ('Entity');")
            .unwrap();
        let result = conn.execute(
            "INSERT INTO edges(source_id, target_id, label) VALUES (1, 1, 'IMPORTS');",
            [],
        );
        assert!(result.is_err());
    }
}
