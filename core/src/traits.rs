//! The storage abstraction shared by the embedded SQLite store and the
//! in-memory test double. Every ingest is one transaction in the order
//! nodes, edges, stats, events; `upsert_*` alone are exposed for callers
//! that already know they have a single kind of element.

use crate::errors::StorageError;
use crate::types::{Edge, Event, Note, Schema, SearchResult, Statistic, Node, Topology};
use async_trait::async_trait;

/// Everything a caller hands to a single ingest operation. Any field may be
/// empty; an empty ingest is a no-op transaction.
#[derive(Debug, Clone, Default)]
pub struct IngestBatch {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: Vec<Statistic>,
    pub events: Vec<Event>,
}

impl IngestBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.stats.is_empty() && self.events.is_empty()
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Persist a batch as a single transaction, in the order nodes, edges,
    /// stats, events. Node upsert COALESCEs `env`; edge upsert updates
    /// properties; statistic upsert overwrites value/unit/timestamp; event
    /// upsert increments `count` and advances `recent_timestamp`.
    async fn ingest(&self, batch: IngestBatch) -> Result<(), StorageError>;

    /// Full-text search over nodes and notes, with graph context (edges,
    /// stats, recent high-severity events, linked notes) gathered for each
    /// matched node.
    async fn search(&self, query: &str, limit: usize) -> Result<SearchResult, StorageError>;

    /// Bounded outgoing-edge traversal from `root_id` up to `depth` hops.
    async fn topology(&self, root_id: &str, depth: u32) -> Result<Topology, StorageError>;

    async fn list_schemas(&self) -> Result<Vec<Schema>, StorageError>;

    async fn get_schema(&self, name: &str) -> Result<Option<Schema>, StorageError>;

    /// Registers a schema defined by a user. Must reject overwriting a
    /// schema whose existing row has `builtin = true`.
    async fn define_schema(&self, schema: Schema) -> Result<(), StorageError>;

    /// (Re)registers a builtin schema at start-up: refreshes blueprint,
    /// description, and the builtin flag while preserving any
    /// user-maintained `services` list already on disk.
    async fn register_builtin_schema(&self, schema: Schema) -> Result<(), StorageError>;

    /// Idempotently adds `service` to the schema's `services` list,
    /// removing the literal `"*"` entry if present.
    async fn add_service_to_schema(&self, name: &str, service: &str) -> Result<(), StorageError>;

    /// Errors if `service` is not currently associated, or the schema does
    /// not exist.
    async fn remove_service_from_schema(&self, name: &str, service: &str) -> Result<(), StorageError>;

    async fn add_note(&self, note: Note) -> Result<(), StorageError>;

    async fn get_note(&self, id: &str) -> Result<Option<Note>, StorageError>;

    /// Removes the note and its link rows; does not touch the nodes/edges
    /// it referenced.
    async fn delete_note(&self, id: &str) -> Result<(), StorageError>;

    async fn health_check(&self) -> Result<(), StorageError>;
}
