//! Self-migration on open (spec §4.7 "Migration discipline"): phase 1
//! creates base tables idempotently, phase 2 adds columns missing from
//! older databases, phase 3 drops and recreates the full-text
//! infrastructure so it stays in lockstep with the base tables, then
//! issues a rebuild.

use kg_core::errors::StorageError;
use rusqlite::Connection;
use tracing::debug;

const BASE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        env TEXT,
        properties TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);

    CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id TEXT NOT NULL REFERENCES nodes(id),
        target_id TEXT NOT NULL REFERENCES nodes(id),
        relation TEXT NOT NULL,
        properties TEXT NOT NULL DEFAULT '{}',
        updated_at TEXT NOT NULL,
        UNIQUE(source_id, target_id, relation)
    );
    CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
    CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

    CREATE TABLE IF NOT EXISTS statistics (
        node_id TEXT NOT NULL REFERENCES nodes(id),
        metric_name TEXT NOT NULL,
        value REAL NOT NULL,
        unit TEXT,
        timestamp TEXT NOT NULL,
        PRIMARY KEY (node_id, metric_name)
    );

    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id TEXT NOT NULL REFERENCES nodes(id),
        target_id TEXT REFERENCES nodes(id),
        type TEXT NOT NULL,
        status TEXT NOT NULL,
        severity TEXT NOT NULL,
        window_start TEXT NOT NULL,
        window_end TEXT NOT NULL,
        recent_timestamp TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 1,
        metadata TEXT NOT NULL DEFAULT '{}',
        UNIQUE(source_id, target_id, type, status, severity, window_start)
    );
    CREATE INDEX IF NOT EXISTS idx_events_source_window ON events(source_id, window_start);

    CREATE TABLE IF NOT EXISTS schemas (
        name TEXT PRIMARY KEY,
        definition TEXT NOT NULL,
        scope_environments TEXT NOT NULL DEFAULT '[]',
        scope_services TEXT NOT NULL DEFAULT '[]',
        description TEXT,
        builtin INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS note_nodes (
        note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
        node_id TEXT NOT NULL,
        PRIMARY KEY (note_id, node_id)
    );
    CREATE TABLE IF NOT EXISTS note_edges (
        note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
        edge_source TEXT NOT NULL,
        edge_target TEXT NOT NULL,
        edge_relation TEXT NOT NULL,
        PRIMARY KEY (note_id, edge_source, edge_target, edge_relation)
    );
";

const FTS_AND_TRIGGERS: &str = "
    DROP TRIGGER IF EXISTS nodes_fts_insert;
    DROP TRIGGER IF EXISTS nodes_fts_update;
    DROP TRIGGER IF EXISTS nodes_fts_delete;
    DROP TABLE IF EXISTS nodes_fts;

    DROP TRIGGER IF EXISTS notes_fts_insert;
    DROP TRIGGER IF EXISTS notes_fts_update;
    DROP TRIGGER IF EXISTS notes_fts_delete;
    DROP TABLE IF EXISTS notes_fts;

    CREATE VIRTUAL TABLE nodes_fts USING fts5(
        id UNINDEXED,
        name,
        type,
        properties,
        env,
        content=nodes,
        content_rowid=rowid
    );
    CREATE TRIGGER nodes_fts_insert AFTER INSERT ON nodes BEGIN
        INSERT INTO nodes_fts(rowid, id, name, type, properties, env)
        VALUES (new.rowid, new.id, new.name, new.type, new.properties, new.env);
    END;
    CREATE TRIGGER nodes_fts_delete AFTER DELETE ON nodes BEGIN
        INSERT INTO nodes_fts(nodes_fts, rowid, id, name, type, properties, env)
        VALUES ('delete', old.rowid, old.id, old.name, old.type, old.properties, old.env);
    END;
    CREATE TRIGGER nodes_fts_update AFTER UPDATE ON nodes BEGIN
        INSERT INTO nodes_fts(nodes_fts, rowid, id, name, type, properties, env)
        VALUES ('delete', old.rowid, old.id, old.name, old.type, old.properties, old.env);
        INSERT INTO nodes_fts(rowid, id, name, type, properties, env)
        VALUES (new.rowid, new.id, new.name, new.type, new.properties, new.env);
    END;

    CREATE VIRTUAL TABLE notes_fts USING fts5(
        title,
        body,
        content=notes,
        content_rowid=rowid
    );
    CREATE TRIGGER notes_fts_insert AFTER INSERT ON notes BEGIN
        INSERT INTO notes_fts(rowid, title, body) VALUES (new.rowid, new.title, new.body);
    END;
    CREATE TRIGGER notes_fts_delete AFTER DELETE ON notes BEGIN
        INSERT INTO notes_fts(notes_fts, rowid, title, body) VALUES ('delete', old.rowid, old.title, old.body);
    END;
    CREATE TRIGGER notes_fts_update AFTER UPDATE ON notes BEGIN
        INSERT INTO notes_fts(notes_fts, rowid, title, body) VALUES ('delete', old.rowid, old.title, old.body);
        INSERT INTO notes_fts(rowid, title, body) VALUES (new.rowid, new.title, new.body);
    END;
";

/// Columns phase 2 must guarantee exist, keyed by table. Empty today —
/// every column in `BASE_TABLES` already ships in the first release — but
/// the check-then-`ALTER` mechanism stays in place for the next one that
/// doesn't.
const EXPECTED_COLUMNS: &[(&str, &[(&str, &str)])] = &[];

pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    debug!("running store migrations, phase 1: base tables");
    conn.execute_batch(BASE_TABLES)?;

    debug!("phase 2: column backfill check");
    for (table, columns) in EXPECTED_COLUMNS {
        backfill_columns(conn, table, columns)?;
    }

    debug!("phase 3: full-text infrastructure rebuild");
    conn.execute_batch(FTS_AND_TRIGGERS)?;
    conn.execute_batch("INSERT INTO nodes_fts(nodes_fts) VALUES ('rebuild');")?;
    conn.execute_batch("INSERT INTO notes_fts(notes_fts) VALUES ('rebuild');")?;

    Ok(())
}

fn backfill_columns(conn: &Connection, table: &str, columns: &[(&str, &str)]) -> Result<(), StorageError> {
    let mut existing = std::collections::HashSet::new();
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        existing.insert(name);
    }
    drop(rows);
    drop(stmt);

    for (column, declaration) in columns {
        if !existing.contains(*column) {
            debug!(table, column, "backfilling missing column");
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {declaration}"), [])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM nodes", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn fts_tables_exist_after_migration() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO nodes (id, type, name, env, properties, created_at, updated_at) VALUES ('service:a','Service','a',NULL,'{}','now','now')",
            [],
        )
        .unwrap();
        let matched: String = conn.query_row("SELECT name FROM nodes_fts WHERE nodes_fts MATCH 'a'", [], |r| r.get(0)).unwrap();
        assert_eq!(matched, "a");
    }
}
