//! In-memory `GraphStore` for tests and local development without a
//! SQLite file on disk. Same trait, same upsert/search/topology/schema
//! semantics as the embedded store; no full-text index, so `search`
//! falls back to a case-insensitive substring scan over name/type/
//! properties and note title/body.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kg_core::errors::StorageError;
use kg_core::traits::{GraphStore, IngestBatch};
use kg_core::types::{Edge, EdgeRef, Event, Node, Note, Schema, SearchResult, Statistic, Topology};
use tokio::sync::RwLock;
use tracing::debug;

type EdgeKey = (String, String, String);
type StatKey = (String, String);
type EventKey = (String, Option<String>, String, String, String, chrono::DateTime<Utc>);

#[derive(Default)]
struct MemoryStore {
    nodes: HashMap<String, Node>,
    edges: HashMap<EdgeKey, Edge>,
    stats: HashMap<StatKey, Statistic>,
    events: HashMap<EventKey, Event>,
    schemas: HashMap<String, Schema>,
    notes: HashMap<String, Note>,
}

impl MemoryStore {
    fn node_exists(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }
}

/// In-memory `GraphStore` implementation.
pub struct MemoryGraphStore {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(MemoryStore::default())) }
    }

    /// Remove everything, for test isolation between cases sharing a store.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        *store = MemoryStore::default();
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_query(haystack: &[&str], query: &str) -> bool {
    let needle = query.to_lowercase();
    haystack.iter().any(|h| h.to_lowercase().contains(&needle))
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn ingest(&self, batch: IngestBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(nodes = batch.nodes.len(), edges = batch.edges.len(), stats = batch.stats.len(), events = batch.events.len(), "ingesting batch (memory)");
        let mut store = self.store.write().await;

        for node in batch.nodes {
            match store.nodes.get_mut(&node.id) {
                Some(existing) => {
                    existing.node_type = node.node_type;
                    existing.name = node.name;
                    existing.env = node.env.or_else(|| existing.env.clone());
                    existing.properties = node.properties;
                    existing.updated_at = node.updated_at;
                }
                None => {
                    store.nodes.insert(node.id.clone(), node);
                }
            }
        }

        for edge in batch.edges {
            if !store.node_exists(&edge.source_id) {
                return Err(StorageError::ForeignKeyViolation(format!("edge source {} does not exist", edge.source_id)));
            }
            if !store.node_exists(&edge.target_id) {
                return Err(StorageError::ForeignKeyViolation(format!("edge target {} does not exist", edge.target_id)));
            }
            let key = (edge.source_id.clone(), edge.target_id.clone(), edge.relation.clone());
            store.edges.insert(key, edge);
        }

        for stat in batch.stats {
            if !store.node_exists(&stat.node_id) {
                return Err(StorageError::ForeignKeyViolation(format!("statistic node {} does not exist", stat.node_id)));
            }
            let key = (stat.node_id.clone(), stat.metric_name.clone());
            store.stats.insert(key, stat);
        }

        for event in batch.events {
            if !store.node_exists(&event.source_id) {
                return Err(StorageError::ForeignKeyViolation(format!("event source {} does not exist", event.source_id)));
            }
            if let Some(target) = &event.target_id {
                if !store.node_exists(target) {
                    return Err(StorageError::ForeignKeyViolation(format!("event target {target} does not exist")));
                }
            }
            let key = (event.source_id.clone(), event.target_id.clone(), event.event_type.clone(), event.status.clone(), event.severity.clone(), event.window_start);
            match store.events.get_mut(&key) {
                Some(existing) => {
                    existing.count += 1;
                    existing.recent_timestamp = event.recent_timestamp;
                    existing.window_end = event.window_end;
                    existing.metadata = event.metadata;
                }
                None => {
                    store.events.insert(key, event);
                }
            }
        }

        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<SearchResult, StorageError> {
        let store = self.store.read().await;

        let mut nodes: Vec<Node> = store
            .nodes
            .values()
            .filter(|n| matches_query(&[&n.id, &n.node_type, &n.name], query))
            .cloned()
            .collect();
        nodes.truncate(limit.max(1));

        let matched_ids: std::collections::HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        let edges: Vec<Edge> = store
            .edges
            .values()
            .filter(|e| matched_ids.contains(e.source_id.as_str()) || matched_ids.contains(e.target_id.as_str()))
            .cloned()
            .collect();

        let stats: Vec<Statistic> = store.stats.values().filter(|s| matched_ids.contains(s.node_id.as_str())).cloned().collect();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let mut events: Vec<Event> = store
            .events
            .values()
            .filter(|e| {
                let touches = matched_ids.contains(e.source_id.as_str()) || e.target_id.as_deref().is_some_and(|t| matched_ids.contains(t));
                touches && matches!(e.severity.as_str(), "error" | "fatal") && e.recent_timestamp >= cutoff
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.recent_timestamp.cmp(&a.recent_timestamp));
        events.truncate(10);

        let mut note_ids: std::collections::HashSet<String> = store
            .notes
            .values()
            .filter(|n| matches_query(&[&n.title, &n.body], query))
            .map(|n| n.id.clone())
            .collect();
        for note in store.notes.values() {
            let linked_node = note.node_ids.iter().any(|id| matched_ids.contains(id.as_str()));
            let linked_edge = note.edge_refs.iter().any(|r| matched_ids.contains(r.source_id.as_str()) || matched_ids.contains(r.target_id.as_str()));
            if linked_node || linked_edge {
                note_ids.insert(note.id.clone());
            }
        }
        let notes: Vec<Note> = note_ids.into_iter().filter_map(|id| store.notes.get(&id).cloned()).collect();

        Ok(SearchResult { nodes, edges, stats, events, notes })
    }

    async fn topology(&self, root_id: &str, depth: u32) -> Result<Topology, StorageError> {
        let store = self.store.read().await;

        let mut visited_nodes: std::collections::HashSet<String> = std::collections::HashSet::new();
        visited_nodes.insert(root_id.to_string());
        let mut visited_edges: std::collections::HashSet<EdgeKey> = std::collections::HashSet::new();
        let mut collected = Vec::new();
        let mut frontier = vec![root_id.to_string()];

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();
            for node_id in &frontier {
                for edge in store.edges.values().filter(|e| &e.source_id == node_id) {
                    let key = (edge.source_id.clone(), edge.target_id.clone(), edge.relation.clone());
                    if visited_edges.insert(key) {
                        if visited_nodes.insert(edge.target_id.clone()) {
                            next_frontier.push(edge.target_id.clone());
                        }
                        collected.push(edge.clone());
                    }
                }
            }
            frontier = next_frontier;
        }

        Ok(Topology { root_id: root_id.to_string(), edges: collected })
    }

    async fn list_schemas(&self) -> Result<Vec<Schema>, StorageError> {
        let store = self.store.read().await;
        let mut schemas: Vec<Schema> = store.schemas.values().cloned().collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schemas)
    }

    async fn get_schema(&self, name: &str) -> Result<Option<Schema>, StorageError> {
        let store = self.store.read().await;
        Ok(store.schemas.get(name).cloned())
    }

    async fn define_schema(&self, schema: Schema) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        if let Some(existing) = store.schemas.get(&schema.name) {
            if existing.builtin {
                return Err(StorageError::ImmutableSchema(schema.name));
            }
        }
        store.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    async fn register_builtin_schema(&self, mut schema: Schema) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        if let Some(existing) = store.schemas.get(&schema.name) {
            schema.services = existing.services.clone();
        }
        store.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    async fn add_service_to_schema(&self, name: &str, service: &str) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        let schema = store.schemas.get_mut(name).ok_or_else(|| StorageError::NotFound(format!("schema {name}")))?;
        schema.services.retain(|s| s != "*");
        if !schema.services.iter().any(|s| s == service) {
            schema.services.push(service.to_string());
        }
        Ok(())
    }

    async fn remove_service_from_schema(&self, name: &str, service: &str) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        let schema = store.schemas.get_mut(name).ok_or_else(|| StorageError::NotFound(format!("schema {name}")))?;
        if !schema.services.iter().any(|s| s == service) {
            return Err(StorageError::NotFound(format!("service {service} not associated with schema {name}")));
        }
        schema.services.retain(|s| s != service);
        Ok(())
    }

    async fn add_note(&self, note: Note) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        store.notes.insert(note.id.clone(), note);
        Ok(())
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>, StorageError> {
        let store = self.store.read().await;
        Ok(store.notes.get(id).cloned())
    }

    async fn delete_note(&self, id: &str) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        store.notes.remove(id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, node_type: &str) -> Node {
        Node::new(id, node_type, id)
    }

    #[tokio::test]
    async fn ingest_then_search_finds_node() {
        let store = MemoryGraphStore::new();
        store.ingest(IngestBatch { nodes: vec![node("service:checkout", "Service")], ..Default::default() }).await.unwrap();
        let result = store.search("checkout", 10).await.unwrap();
        assert_eq!(result.nodes.len(), 1);
    }

    #[tokio::test]
    async fn edge_without_nodes_is_foreign_key_violation() {
        let store = MemoryGraphStore::new();
        let batch = IngestBatch { edges: vec![Edge::new("service:a", "CALLS", "service:b")], ..Default::default() };
        let err = store.ingest(batch).await.unwrap_err();
        assert!(matches!(err, StorageError::ForeignKeyViolation(_)));
    }

    #[tokio::test]
    async fn node_env_is_preserved_when_incoming_is_none() {
        let store = MemoryGraphStore::new();
        store.ingest(IngestBatch { nodes: vec![node("service:a", "Service").with_env("prod")], ..Default::default() }).await.unwrap();
        store.ingest(IngestBatch { nodes: vec![node("service:a", "Service")], ..Default::default() }).await.unwrap();
        let result = store.search("a", 10).await.unwrap();
        assert_eq!(result.nodes[0].env.as_deref(), Some("prod"));
    }

    #[tokio::test]
    async fn event_upsert_increments_count() {
        let store = MemoryGraphStore::new();
        store.ingest(IngestBatch { nodes: vec![node("service:a", "Service")], ..Default::default() }).await.unwrap();

        let window_start = Utc::now();
        let event = Event {
            source_id: "service:a".into(),
            target_id: None,
            event_type: "restart".into(),
            status: "crashed".into(),
            severity: "error".into(),
            window_start,
            window_end: window_start,
            recent_timestamp: window_start,
            count: 1,
            metadata: json!({}),
        };

        store.ingest(IngestBatch { events: vec![event.clone()], ..Default::default() }).await.unwrap();
        store.ingest(IngestBatch { events: vec![event], ..Default::default() }).await.unwrap();

        let result = store.search("a", 10).await.unwrap();
        assert_eq!(result.events[0].count, 2);
    }

    #[tokio::test]
    async fn topology_respects_depth_bound() {
        let store = MemoryGraphStore::new();
        store
            .ingest(IngestBatch {
                nodes: vec![node("service:a", "Service"), node("service:b", "Service"), node("service:c", "Service")],
                edges: vec![Edge::new("service:a", "CALLS", "service:b"), Edge::new("service:b", "CALLS", "service:c")],
                ..Default::default()
            })
            .await
            .unwrap();

        let one_hop = store.topology("service:a", 1).await.unwrap();
        assert_eq!(one_hop.edges.len(), 1);
        let two_hop = store.topology("service:a", 2).await.unwrap();
        assert_eq!(two_hop.edges.len(), 2);
    }

    #[tokio::test]
    async fn define_schema_rejects_builtin_overwrite() {
        let store = MemoryGraphStore::new();
        store.register_builtin_schema(Schema::builtin("http_k8s_datastore", Default::default(), "builtin")).await.unwrap();
        let mut attempt = Schema::builtin("http_k8s_datastore", Default::default(), "attempt");
        attempt.builtin = false;
        let err = store.define_schema(attempt).await.unwrap_err();
        assert!(matches!(err, StorageError::ImmutableSchema(_)));
    }

    #[tokio::test]
    async fn note_crud_round_trip() {
        let store = MemoryGraphStore::new();
        let note = Note {
            id: "note:1".into(),
            title: "incident".into(),
            body: "checkout degraded".into(),
            created_at: Utc::now(),
            node_ids: vec!["service:a".into()],
            edge_refs: vec![EdgeRef { source_id: "service:a".into(), target_id: "service:a".into(), relation: "SELF".into() }],
        };
        store.add_note(note.clone()).await.unwrap();
        assert_eq!(store.get_note("note:1").await.unwrap().unwrap().title, "incident");
        store.delete_note("note:1").await.unwrap();
        assert!(store.get_note("note:1").await.unwrap().is_none());
    }
}
