//! Embedded builtin schemas (spec §6 "Embedded assets"): YAML blueprint
//! definitions compiled into the binary and (re)registered at startup.

use kg_core::types::{Blueprint, Schema};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct YamlBlueprint {
    description: String,
    node_types: Vec<String>,
    edge_patterns: Vec<String>,
    #[serde(default)]
    field_hints: HashMap<String, Vec<String>>,
}

const RAW: &[(&str, &str)] = &[
    ("http_k8s_datastore", include_str!("../assets/http_k8s_datastore.yaml")),
    ("ingest_gateway", include_str!("../assets/ingest_gateway.yaml")),
    ("kafka_consumer_jobs", include_str!("../assets/kafka_consumer_jobs.yaml")),
    ("http_vm_datastore", include_str!("../assets/http_vm_datastore.yaml")),
];

/// Parses every embedded YAML asset into a builtin `Schema`. Panics on a
/// malformed asset: these are compiled into the binary, so a parse failure
/// here is a build-time defect, not a runtime condition to recover from.
pub fn builtin_schemas() -> Vec<Schema> {
    RAW.iter()
        .map(|(name, yaml)| {
            let parsed: YamlBlueprint = serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("embedded schema {name} is malformed: {e}"));
            let field_hints = parsed
                .field_hints
                .into_iter()
                .map(|(k, v)| (k, serde_json::to_value(v).expect("string vec always serializes")))
                .collect();
            let blueprint = Blueprint {
                node_types: parsed.node_types,
                edge_patterns: parsed.edge_patterns,
                field_hints,
            };
            Schema::builtin(*name, blueprint, parsed.description)
        })
        .collect()
}
