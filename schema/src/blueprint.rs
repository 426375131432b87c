//! Parses a blueprint's `"Source -> RELATION -> Target"` edge-pattern
//! strings into structural triples, and derives the same triple shape from
//! an already-extracted graph (spec §4.6).

use kg_core::types::{Blueprint, Edge, Node};
use std::collections::{HashMap, HashSet};

pub type Triple = (String, String, String);

pub fn blueprint_triples(blueprint: &Blueprint) -> HashSet<Triple> {
    blueprint.edge_patterns.iter().filter_map(|p| parse_pattern(p)).collect()
}

fn parse_pattern(pattern: &str) -> Option<Triple> {
    let parts: Vec<&str> = pattern.split("->").map(str::trim).collect();
    match parts.as_slice() {
        [source, relation, target] => Some((source.to_string(), relation.to_string(), target.to_string())),
        _ => None,
    }
}

/// The input subgraph's signature: `(SourceType, Relation, TargetType)` for
/// every edge, resolved through the node-type map built from `nodes`.
pub fn input_signature(nodes: &[Node], edges: &[Edge]) -> HashSet<Triple> {
    let types: HashMap<&str, &str> = nodes.iter().map(|n| (n.id.as_str(), n.node_type.as_str())).collect();
    edges
        .iter()
        .filter_map(|e| {
            let source_type = types.get(e.source_id.as_str())?;
            let target_type = types.get(e.target_id.as_str())?;
            Some((source_type.to_string(), e.relation.clone(), target_type.to_string()))
        })
        .collect()
}

pub fn input_node_types(nodes: &[Node]) -> HashSet<String> {
    nodes.iter().map(|n| n.node_type.clone()).collect()
}
