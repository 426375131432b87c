//! The embedded `GraphStore`: a single SQLite connection behind a mutex,
//! moved onto a blocking thread per call since rusqlite has no async story
//! of its own.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kg_core::errors::StorageError;
use kg_core::traits::{GraphStore, IngestBatch};
use kg_core::types::{Edge, Event, Node, Note, Schema, SearchResult, Statistic, Topology};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::convert::{edge_from_row, edge_ref_from_row, event_from_row, node_from_row, note_from_row, schema_from_row, statistic_from_row, to_json_text};
use crate::schema as migrations;

const SCHEMA_COLUMNS: &str = "name, definition, scope_environments, scope_services, description, builtin, created_at";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        migrations::run_migrations(&conn)?;
        info!("store opened and migrated");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("store mutex poisoned");
            f(&guard)
        })
        .await
        .expect("store worker thread panicked")
    }

    async fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("store mutex poisoned");
            f(&mut guard)
        })
        .await
        .expect("store worker thread panicked")
    }
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<Result<T, StorageError>>>) -> Result<Vec<T>, StorageError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

fn map_sqlite_err(context: &str, err: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref ffi_err, Some(ref msg)) = err {
        if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation {
            return StorageError::ForeignKeyViolation(format!("{context}: {msg}"));
        }
    }
    StorageError::Sqlite(err)
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

fn upsert_node(tx: &Transaction, node: &Node) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO nodes (id, type, name, env, properties, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             type = excluded.type,
             name = excluded.name,
             env = COALESCE(excluded.env, nodes.env),
             properties = excluded.properties,
             updated_at = excluded.updated_at",
        params![node.id, node.node_type, node.name, node.env, to_json_text(&node.properties), node.created_at, node.updated_at],
    )?;
    Ok(())
}

fn upsert_edge(tx: &Transaction, edge: &Edge) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO edges (source_id, target_id, relation, properties, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(source_id, target_id, relation) DO UPDATE SET
             properties = excluded.properties,
             updated_at = excluded.updated_at",
        params![edge.source_id, edge.target_id, edge.relation, to_json_text(&edge.properties), edge.updated_at],
    )
    .map_err(|e| map_sqlite_err("edge endpoints must reference existing nodes", e))?;
    Ok(())
}

fn upsert_statistic(tx: &Transaction, stat: &Statistic) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO statistics (node_id, metric_name, value, unit, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(node_id, metric_name) DO UPDATE SET
             value = excluded.value,
             unit = excluded.unit,
             timestamp = excluded.timestamp",
        params![stat.node_id, stat.metric_name, stat.value, stat.unit, stat.timestamp],
    )
    .map_err(|e| map_sqlite_err("statistic node_id must reference an existing node", e))?;
    Ok(())
}

fn upsert_event(tx: &Transaction, event: &Event) -> Result<(), StorageError> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM events
             WHERE source_id = ?1 AND target_id IS ?2 AND type = ?3 AND status = ?4 AND severity = ?5 AND window_start = ?6",
            params![event.source_id, event.target_id, event.event_type, event.status, event.severity, event.window_start],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            tx.execute(
                "UPDATE events SET count = count + 1, recent_timestamp = ?1, window_end = ?2, metadata = ?3 WHERE id = ?4",
                params![event.recent_timestamp, event.window_end, to_json_text(&event.metadata), id],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO events (source_id, target_id, type, status, severity, window_start, window_end, recent_timestamp, count, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event.source_id,
                    event.target_id,
                    event.event_type,
                    event.status,
                    event.severity,
                    event.window_start,
                    event.window_end,
                    event.recent_timestamp,
                    event.count,
                    to_json_text(&event.metadata),
                ],
            )
            .map_err(|e| map_sqlite_err("event endpoints must reference existing nodes", e))?;
        }
    }
    Ok(())
}

fn ingest_tx(conn: &mut Connection, batch: &IngestBatch) -> Result<(), StorageError> {
    let tx = conn.transaction()?;
    for node in &batch.nodes {
        upsert_node(&tx, node)?;
    }
    for edge in &batch.edges {
        upsert_edge(&tx, edge)?;
    }
    for stat in &batch.stats {
        upsert_statistic(&tx, stat)?;
    }
    for event in &batch.events {
        upsert_event(&tx, event)?;
    }
    tx.commit()?;
    Ok(())
}

fn fetch_note(conn: &Connection, id: &str) -> Result<Option<Note>, StorageError> {
    let mut note = match conn
        .query_row("SELECT id, title, body, created_at FROM notes WHERE id = ?1", params![id], |row| note_from_row(row))
        .optional()?
    {
        Some(n) => n,
        None => return Ok(None),
    };
    hydrate_note_links(conn, &mut note)?;
    Ok(Some(note))
}

fn hydrate_note_links(conn: &Connection, note: &mut Note) -> Result<(), StorageError> {
    let mut node_stmt = conn.prepare("SELECT node_id FROM note_nodes WHERE note_id = ?1")?;
    note.node_ids = node_stmt.query_map(params![note.id], |row| row.get::<_, String>(0))?.collect::<rusqlite::Result<Vec<_>>>()?;

    let mut edge_stmt = conn.prepare("SELECT edge_source, edge_target, edge_relation FROM note_edges WHERE note_id = ?1")?;
    note.edge_refs = edge_stmt.query_map(params![note.id], |row| edge_ref_from_row(row))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(())
}

fn search_blocking(conn: &Connection, query: &str, limit: usize) -> Result<SearchResult, StorageError> {
    let limit = limit.max(1) as i64;

    let nodes = {
        let mut stmt = conn.prepare(
            "SELECT n.id, n.type, n.name, n.env, n.properties, n.created_at, n.updated_at
             FROM nodes_fts f JOIN nodes n ON n.rowid = f.rowid
             WHERE nodes_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        collect_rows(stmt.query_map(params![query, limit], |row| node_from_row(row))?)?
    };

    let fts_note_ids: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT n.id FROM notes_fts f JOIN notes n ON n.rowid = f.rowid
             WHERE notes_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        stmt.query_map(params![query, limit], |row| row.get::<_, String>(0))?.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut note_ids: HashSet<String> = fts_note_ids.into_iter().collect();

    if nodes.is_empty() {
        let mut notes = Vec::new();
        for id in &note_ids {
            if let Some(note) = fetch_note(conn, id)? {
                notes.push(note);
            }
        }
        return Ok(SearchResult { nodes, notes, ..Default::default() });
    }

    let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let single = placeholders(node_ids.len());
    let doubled: Vec<String> = node_ids.iter().cloned().chain(node_ids.iter().cloned()).collect();
    let double_ph = placeholders(doubled.len());

    let edges = {
        let sql = format!("SELECT source_id, target_id, relation, properties, updated_at FROM edges WHERE source_id IN ({single}) OR target_id IN ({single})");
        let mut stmt = conn.prepare(&sql)?;
        collect_rows(stmt.query_map(rusqlite::params_from_iter(doubled.iter()), |row| edge_from_row(row))?)?
    };

    let stats = {
        let sql = format!("SELECT node_id, metric_name, value, unit, timestamp FROM statistics WHERE node_id IN ({single})");
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_map(rusqlite::params_from_iter(node_ids.iter()), |row| statistic_from_row(row))?.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let events = {
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let sql = format!(
            "SELECT source_id, target_id, type, status, severity, window_start, window_end, recent_timestamp, count, metadata
             FROM events
             WHERE (source_id IN ({double_ph}) OR target_id IN ({double_ph}))
               AND severity IN ('error', 'fatal')
               AND recent_timestamp >= ?{next}
             ORDER BY recent_timestamp DESC LIMIT 10",
            next = doubled.len() * 2 + 1,
        );
        let quadrupled: Vec<&str> = doubled.iter().map(String::as_str).chain(doubled.iter().map(String::as_str)).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut qparams: Vec<&dyn rusqlite::ToSql> = quadrupled.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        qparams.push(&cutoff);
        collect_rows(stmt.query_map(qparams.as_slice(), |row| event_from_row(row))?)?
    };

    {
        let sql = format!("SELECT DISTINCT note_id FROM note_nodes WHERE node_id IN ({single})");
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt.query_map(rusqlite::params_from_iter(node_ids.iter()), |row| row.get::<_, String>(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        note_ids.extend(ids);
    }
    {
        let sql = format!("SELECT DISTINCT note_id FROM note_edges WHERE edge_source IN ({single}) OR edge_target IN ({single})");
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt.query_map(rusqlite::params_from_iter(doubled.iter()), |row| row.get::<_, String>(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        note_ids.extend(ids);
    }

    let mut notes = Vec::new();
    for id in &note_ids {
        if let Some(note) = fetch_note(conn, id)? {
            notes.push(note);
        }
    }

    Ok(SearchResult { nodes, edges, stats, events, notes })
}

fn topology_blocking(conn: &Connection, root_id: &str, depth: u32) -> Result<Topology, StorageError> {
    let mut visited_nodes: HashSet<String> = HashSet::new();
    visited_nodes.insert(root_id.to_string());
    let mut visited_edges: HashSet<(String, String, String)> = HashSet::new();
    let mut collected = Vec::new();
    let mut frontier = vec![root_id.to_string()];

    let mut stmt = conn.prepare("SELECT source_id, target_id, relation, properties, updated_at FROM edges WHERE source_id = ?1")?;

    for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier = Vec::new();
        for node_id in &frontier {
            let edges = collect_rows(stmt.query_map(params![node_id], |row| edge_from_row(row))?)?;
            for edge in edges {
                let key = (edge.source_id.clone(), edge.target_id.clone(), edge.relation.clone());
                if visited_edges.insert(key) {
                    if visited_nodes.insert(edge.target_id.clone()) {
                        next_frontier.push(edge.target_id.clone());
                    }
                    collected.push(edge);
                }
            }
        }
        frontier = next_frontier;
    }

    Ok(Topology { root_id: root_id.to_string(), edges: collected })
}

fn list_schemas_blocking(conn: &Connection) -> Result<Vec<Schema>, StorageError> {
    let mut stmt = conn.prepare(&format!("SELECT {SCHEMA_COLUMNS} FROM schemas ORDER BY name"))?;
    collect_rows(stmt.query_map([], |row| schema_from_row(row))?)
}

fn get_schema_blocking(conn: &Connection, name: &str) -> Result<Option<Schema>, StorageError> {
    let row: Option<Result<Schema, StorageError>> = conn
        .query_row(&format!("SELECT {SCHEMA_COLUMNS} FROM schemas WHERE name = ?1"), params![name], |row| schema_from_row(row))
        .optional()?;
    row.transpose()
}

fn write_schema_row(conn: &Connection, schema: &Schema, created_at: DateTime<Utc>) -> Result<(), StorageError> {
    let definition = serde_json::to_string(&schema.blueprint).map_err(|source| StorageError::MalformedJson { column: "schemas.definition".to_string(), source })?;
    let environments = serde_json::to_string(&schema.environments).map_err(|source| StorageError::MalformedJson { column: "schemas.scope_environments".to_string(), source })?;
    let services = serde_json::to_string(&schema.services).map_err(|source| StorageError::MalformedJson { column: "schemas.scope_services".to_string(), source })?;

    conn.execute(
        "INSERT INTO schemas (name, definition, scope_environments, scope_services, description, builtin, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(name) DO UPDATE SET
             definition = excluded.definition,
             scope_environments = excluded.scope_environments,
             scope_services = excluded.scope_services,
             description = excluded.description,
             builtin = excluded.builtin",
        params![schema.name, definition, environments, services, schema.description, schema.builtin as i64, created_at],
    )?;
    Ok(())
}

fn define_schema_blocking(conn: &Connection, schema: &Schema) -> Result<(), StorageError> {
    if let Some(existing) = get_schema_blocking(conn, &schema.name)? {
        if existing.builtin {
            return Err(StorageError::ImmutableSchema(schema.name.clone()));
        }
    }
    write_schema_row(conn, schema, schema.created_at)
}

fn register_builtin_schema_blocking(conn: &Connection, schema: &Schema) -> Result<(), StorageError> {
    let services = match get_schema_blocking(conn, &schema.name)? {
        Some(existing) => existing.services,
        None => schema.services.clone(),
    };
    let mut to_write = schema.clone();
    to_write.services = services;
    write_schema_row(conn, &to_write, schema.created_at)
}

fn add_service_to_schema_blocking(conn: &Connection, name: &str, service: &str) -> Result<(), StorageError> {
    let mut schema = get_schema_blocking(conn, name)?.ok_or_else(|| StorageError::NotFound(format!("schema {name}")))?;
    schema.services.retain(|s| s != "*");
    if !schema.services.iter().any(|s| s == service) {
        schema.services.push(service.to_string());
    }
    let created_at = schema.created_at;
    write_schema_row(conn, &schema, created_at)
}

fn remove_service_from_schema_blocking(conn: &Connection, name: &str, service: &str) -> Result<(), StorageError> {
    let mut schema = get_schema_blocking(conn, name)?.ok_or_else(|| StorageError::NotFound(format!("schema {name}")))?;
    if !schema.services.iter().any(|s| s == service) {
        return Err(StorageError::NotFound(format!("service {service} not associated with schema {name}")));
    }
    schema.services.retain(|s| s != service);
    let created_at = schema.created_at;
    write_schema_row(conn, &schema, created_at)
}

fn add_note_blocking(conn: &mut Connection, note: &Note) -> Result<(), StorageError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO notes (id, title, body, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, body = excluded.body",
        params![note.id, note.title, note.body, note.created_at],
    )?;
    tx.execute("DELETE FROM note_nodes WHERE note_id = ?1", params![note.id])?;
    for node_id in &note.node_ids {
        tx.execute("INSERT INTO note_nodes (note_id, node_id) VALUES (?1, ?2)", params![note.id, node_id])?;
    }
    tx.execute("DELETE FROM note_edges WHERE note_id = ?1", params![note.id])?;
    for edge_ref in &note.edge_refs {
        tx.execute(
            "INSERT INTO note_edges (note_id, edge_source, edge_target, edge_relation) VALUES (?1, ?2, ?3, ?4)",
            params![note.id, edge_ref.source_id, edge_ref.target_id, edge_ref.relation],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn delete_note_blocking(conn: &Connection, id: &str) -> Result<(), StorageError> {
    conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
    Ok(())
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn ingest(&self, batch: IngestBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(nodes = batch.nodes.len(), edges = batch.edges.len(), stats = batch.stats.len(), events = batch.events.len(), "ingesting batch");
        self.with_conn_mut(move |conn| ingest_tx(conn, &batch)).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<SearchResult, StorageError> {
        let query = query.to_string();
        self.with_conn(move |conn| search_blocking(conn, &query, limit)).await
    }

    async fn topology(&self, root_id: &str, depth: u32) -> Result<Topology, StorageError> {
        let root_id = root_id.to_string();
        self.with_conn(move |conn| topology_blocking(conn, &root_id, depth)).await
    }

    async fn list_schemas(&self) -> Result<Vec<Schema>, StorageError> {
        self.with_conn(list_schemas_blocking).await
    }

    async fn get_schema(&self, name: &str) -> Result<Option<Schema>, StorageError> {
        let name = name.to_string();
        self.with_conn(move |conn| get_schema_blocking(conn, &name)).await
    }

    async fn define_schema(&self, schema: Schema) -> Result<(), StorageError> {
        self.with_conn(move |conn| define_schema_blocking(conn, &schema)).await
    }

    async fn register_builtin_schema(&self, schema: Schema) -> Result<(), StorageError> {
        self.with_conn(move |conn| register_builtin_schema_blocking(conn, &schema)).await
    }

    async fn add_service_to_schema(&self, name: &str, service: &str) -> Result<(), StorageError> {
        let name = name.to_string();
        let service = service.to_string();
        self.with_conn(move |conn| add_service_to_schema_blocking(conn, &name, &service)).await
    }

    async fn remove_service_from_schema(&self, name: &str, service: &str) -> Result<(), StorageError> {
        let name = name.to_string();
        let service = service.to_string();
        self.with_conn(move |conn| remove_service_from_schema_blocking(conn, &name, &service)).await
    }

    async fn add_note(&self, note: Note) -> Result<(), StorageError> {
        self.with_conn_mut(move |conn| add_note_blocking(conn, &note)).await
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| fetch_note(conn, &id)).await
    }

    async fn delete_note(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| delete_note_blocking(conn, &id)).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).map_err(StorageError::from)).await
    }
}
