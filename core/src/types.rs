//! Shared data model: nodes, edges, statistics, events, schemas, notes, and
//! the small intermediate types the extraction pipeline passes around
//! in-memory before a store persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;

/// Builds a node id as `lowercase(type):scope[0]:scope[1]:...`.
///
/// `make_node_id("Pod", &["ns", "p1"])` == `"pod:ns:p1"`.
pub fn make_node_id(node_type: &str, scope: &[&str]) -> String {
    let mut id = node_type.to_lowercase();
    for part in scope {
        id.push(':');
        id.push_str(part);
    }
    id
}

fn default_properties() -> Json {
    Json::Object(Default::default())
}

fn one() -> i64 {
    1
}

/// A graph entity. `id` is the natural key; `env` follows COALESCE upsert
/// semantics at the store layer (an empty incoming value never clobbers a
/// previously recorded one).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default = "default_properties")]
    pub properties: Json,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            node_type: node_type.into(),
            name: name.into(),
            env: None,
            properties: default_properties(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_properties(mut self, properties: Json) -> Self {
        self.properties = properties;
        self
    }
}

/// `(source_id, target_id, relation)` is the natural key; at most one edge
/// per triple. Both endpoints must reference existing nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub relation: String,
    #[serde(default = "default_properties")]
    pub properties: Json,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(source_id: impl Into<String>, relation: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation: relation.into(),
            properties: default_properties(),
            updated_at: Utc::now(),
        }
    }
}

/// `(node_id, metric_name)` natural key. Upsert replaces the prior value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statistic {
    pub node_id: String,
    pub metric_name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// An occurrence aggregated into a fixed 5-minute time bucket. The natural
/// key is `(source_id, target_id, event_type, status, severity,
/// window_start)`; a matching subsequent ingest increments `count` and
/// advances `recent_timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub status: String,
    pub severity: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub recent_timestamp: DateTime<Utc>,
    #[serde(default = "one")]
    pub count: i64,
    #[serde(default = "default_properties")]
    pub metadata: Json,
}

/// Allowed node types and edge patterns a set of extracted graph elements
/// can be scored against. `"SourceType -> RELATION -> TargetType"` is the
/// canonical string form of an allowed edge pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Blueprint {
    pub node_types: Vec<String>,
    pub edge_patterns: Vec<String>,
    #[serde(default)]
    pub field_hints: HashMap<String, Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub name: String,
    pub blueprint: Blueprint,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub builtin: bool,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Schema {
    pub fn builtin(name: impl Into<String>, blueprint: Blueprint, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blueprint,
            description: Some(description.into()),
            builtin: true,
            environments: Vec::new(),
            services: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// A reference to an edge by its natural key, used by note links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub source_id: String,
    pub target_id: String,
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub edge_refs: Vec<EdgeRef>,
}

/// The in-memory output of the extraction pipeline. Never persisted as-is;
/// a store consumes its `nodes`/`edges`/`stats` fields directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExtractionResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: Vec<Statistic>,
    pub confidence: f64,
    pub pattern: String,
}

/// The combined result of a full-text search across nodes and notes, plus
/// the graph context (edges, stats, recent events) gathered for each
/// matched node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: Vec<Statistic>,
    pub events: Vec<Event>,
    pub notes: Vec<Note>,
}

/// A bounded outgoing-edge traversal from `root_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub root_id: String,
    pub edges: Vec<Edge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_lowercases_type_and_joins_scope() {
        assert_eq!(make_node_id("Pod", &["ns", "p1"]), "pod:ns:p1");
        assert_eq!(make_node_id("Service", &["payment-api"]), "service:payment-api");
    }

    #[test]
    fn node_builder_sets_env() {
        let n = Node::new("service:x", "Service", "x").with_env("prod");
        assert_eq!(n.env.as_deref(), Some("prod"));
    }
}
