//! Schema scoring (spec §4.6): weighted blend of edge coverage, node
//! coverage, and field confidence, plus the `ResolveNodeType` alias/
//! similarity lookup.

use crate::blueprint::{blueprint_triples, Triple};
use crate::tokens::{best_token_similarity, token_similarity};
use kg_core::types::Schema;
use std::collections::HashSet;

const MATCH_THRESHOLD: f64 = 0.6;
const RESOLVE_THRESHOLD: f64 = 0.5;

const FIELD_ALIASES: &[(&str, &str)] = &[
    ("service_name", "Service"),
    ("db_system", "DataStoreInstance"),
    ("messaging_system", "KafkaTopic"),
    ("k8s_pod_name", "Pod"),
    ("k8s_namespace_name", "Namespace"),
    ("k8s_node_name", "Node"),
    ("k8s_deployment_name", "Deployment"),
    ("k8s_container_name", "Container"),
    ("consumer_group", "ConsumerGroup"),
    ("topic", "KafkaTopic"),
    ("operation", "HTTPEndpoint"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSchema {
    pub name: String,
    pub score: f64,
}

/// Scores every schema against an input's signature and node-type set;
/// returns schemas with `score >= 0.6`, sorted by score descending, ties
/// broken by name ascending.
pub fn match_schemas(input_sig: &HashSet<Triple>, input_node_types: &HashSet<String>, schemas: &[Schema]) -> Vec<ScoredSchema> {
    let input_types_vec: Vec<String> = input_node_types.iter().cloned().collect();

    let mut scored: Vec<ScoredSchema> = schemas
        .iter()
        .map(|schema| {
            let schema_sig = blueprint_triples(&schema.blueprint);
            let schema_node_types = &schema.blueprint.node_types;

            let edge_coverage = if input_sig.is_empty() {
                0.0
            } else {
                input_sig.intersection(&schema_sig).count() as f64 / input_sig.len() as f64
            };
            let node_coverage = if input_node_types.is_empty() {
                0.0
            } else {
                let schema_types: HashSet<&String> = schema_node_types.iter().collect();
                input_node_types.iter().filter(|t| schema_types.contains(t)).count() as f64 / input_node_types.len() as f64
            };
            let field_confidence = if input_types_vec.is_empty() {
                0.0
            } else {
                let sum: f64 = input_types_vec.iter().map(|t| best_token_similarity(t, schema_node_types)).sum();
                sum / input_types_vec.len() as f64
            };

            let score = 0.5 * edge_coverage + 0.3 * node_coverage + 0.2 * field_confidence;
            ScoredSchema { name: schema.name.clone(), score }
        })
        .filter(|s| s.score >= MATCH_THRESHOLD)
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.name.cmp(&b.name)));
    scored
}

/// Resolves a raw field name to a schema node type: an exact alias table
/// first, then the schema node with the highest token similarity (must be
/// at least 0.5).
pub fn resolve_node_type(field: &str, schema_nodes: &[String]) -> Option<String> {
    if let Some((_, node_type)) = FIELD_ALIASES.iter().find(|(f, _)| *f == field) {
        if schema_nodes.iter().any(|n| n == node_type) {
            return Some(node_type.to_string());
        }
    }
    schema_nodes
        .iter()
        .map(|n| (n, token_similarity(field, n)))
        .filter(|(_, score)| *score >= RESOLVE_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(n, _)| n.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_core::types::Blueprint;

    fn schema(name: &str, node_types: &[&str], edges: &[&str]) -> Schema {
        Schema::builtin(
            name,
            Blueprint {
                node_types: node_types.iter().map(|s| s.to_string()).collect(),
                edge_patterns: edges.iter().map(|s| s.to_string()).collect(),
                field_hints: Default::default(),
            },
            "test schema",
        )
    }

    #[test]
    fn scores_full_overlap_highest() {
        let schemas = vec![
            schema("http_k8s_datastore", &["Service", "HTTPEndpoint", "DataStoreInstance"], &["Service -> EXPOSES -> HTTPEndpoint", "Service -> CONNECTS_TO -> DataStoreInstance"]),
            schema("kafka_consumer_jobs", &["ConsumerGroup", "KafkaTopic"], &["ConsumerGroup -> CONSUMES_FROM -> KafkaTopic"]),
        ];
        let input_sig: HashSet<Triple> = [
            ("Service".to_string(), "EXPOSES".to_string(), "HTTPEndpoint".to_string()),
            ("Service".to_string(), "CONNECTS_TO".to_string(), "DataStoreInstance".to_string()),
        ]
        .into_iter()
        .collect();
        let input_types: HashSet<String> = ["Service", "HTTPEndpoint", "DataStoreInstance"].iter().map(|s| s.to_string()).collect();

        let results = match_schemas(&input_sig, &input_types, &schemas);
        assert_eq!(results[0].name, "http_k8s_datastore");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn resolves_exact_alias() {
        let nodes = vec!["Service".to_string(), "HTTPEndpoint".to_string()];
        assert_eq!(resolve_node_type("service_name", &nodes), Some("Service".to_string()));
    }

    #[test]
    fn resolves_via_similarity_when_no_alias() {
        let nodes = vec!["DataStoreInstance".to_string()];
        assert_eq!(resolve_node_type("data_store_instance", &nodes), Some("DataStoreInstance".to_string()));
    }

    #[test]
    fn unresolvable_field_returns_none() {
        let nodes = vec!["Service".to_string()];
        assert_eq!(resolve_node_type("completely_unrelated_xyz", &nodes), None);
    }
}
