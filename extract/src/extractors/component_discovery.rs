//! Highest-priority extractor: explicit component lists plus relationship
//! triples (spec §4.4 "Component Discovery").

use super::{normalize_component_type, top_level_env, Extractor};
use kg_core::dedup::NodeSink;
use kg_core::types::{make_node_id, Edge, ExtractionResult, Node};
use serde_json::Value as Json;

pub struct ComponentDiscoveryExtractor;

impl Extractor for ComponentDiscoveryExtractor {
    fn name(&self) -> &'static str {
        "component_discovery"
    }

    fn can_handle(&self, parsed: &Json) -> bool {
        let Some(obj) = parsed.as_object() else { return false };
        matches!(obj.get("components"), Some(Json::Object(_))) && matches!(obj.get("triples"), Some(Json::Array(_)))
    }

    fn extract(&self, parsed: &Json) -> ExtractionResult {
        let obj = parsed.as_object().expect("can_handle checked this is an object");
        let env = top_level_env(obj);

        let mut sink = NodeSink::new();
        if let Some(Json::Object(components)) = obj.get("components") {
            for (raw_type, names) in components {
                let node_type = normalize_component_type(raw_type);
                let Some(names) = names.as_array() else { continue };
                for name in names.iter().filter_map(|n| n.as_str()) {
                    let id = make_node_id(&node_type, &[name]);
                    let mut node = Node::new(id, node_type.clone(), name);
                    if let Some(env) = &env {
                        node = node.with_env(env.clone());
                    }
                    sink.push(node);
                }
            }
        }
        let nodes = sink.into_vec();

        let mut edges = Vec::new();
        let mut extra_unknown = NodeSink::new();
        if let Some(Json::Array(triples)) = obj.get("triples") {
            for triple in triples {
                let Some(t) = triple.as_object() else { continue };
                let (Some(src), Some(rel), Some(dst)) = (
                    t.get("src").and_then(|v| v.as_str()),
                    t.get("rel").and_then(|v| v.as_str()),
                    t.get("dst").and_then(|v| v.as_str()),
                ) else {
                    continue;
                };
                let src_id = resolve_endpoint(&nodes, src, &mut extra_unknown);
                let dst_id = resolve_endpoint(&nodes, dst, &mut extra_unknown);
                edges.push(Edge::new(src_id, rel, dst_id));
            }
        }

        let mut all_nodes = nodes;
        all_nodes.extend(extra_unknown.into_vec());

        let confidence = if all_nodes.is_empty() { 0.2 } else { 0.9 };
        ExtractionResult {
            nodes: all_nodes,
            edges,
            stats: Vec::new(),
            confidence,
            pattern: self.name().to_string(),
        }
    }
}

/// Resolves a triple endpoint by suffix against the current node set's
/// `name` field (a triple's `src`/`dst` may carry a qualified path like
/// `ns/checkout` that only ends with the shorter node name `checkout`);
/// ties go to the longest matching name. Unresolved endpoints become
/// `Unknown`-type nodes.
fn resolve_endpoint(nodes: &[Node], name: &str, unknowns: &mut NodeSink) -> String {
    let found = nodes.iter().filter(|n| name.ends_with(n.name.as_str())).max_by_key(|n| n.name.len());
    if let Some(found) = found {
        return found.id.clone();
    }
    let id = make_node_id("Unknown", &[name]);
    unknowns.push(Node::new(id.clone(), "Unknown", name));
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_nodes_and_resolves_triples() {
        let input = json!({
            "components": {"POD": ["p1"], "SERVICE": ["checkout"]},
            "triples": [{"src": "p1", "rel": "RUNS_ON", "dst": "checkout"}]
        });
        let extractor = ComponentDiscoveryExtractor;
        assert!(extractor.can_handle(&input));
        let result = extractor.extract(&input);
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.edges.len(), 1);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn unresolved_triple_endpoint_becomes_unknown_node() {
        let input = json!({
            "components": {"POD": ["p1"]},
            "triples": [{"src": "p1", "rel": "CALLS", "dst": "ghost"}]
        });
        let extractor = ComponentDiscoveryExtractor;
        let result = extractor.extract(&input);
        assert!(result.nodes.iter().any(|n| n.node_type == "Unknown" && n.name == "ghost"));
    }

    #[test]
    fn triple_endpoint_resolves_by_name_suffix() {
        let input = json!({
            "components": {"SERVICE": ["checkout"]},
            "triples": [{"src": "ns/checkout", "rel": "EXPOSES", "dst": "checkout"}]
        });
        let result = ComponentDiscoveryExtractor.extract(&input);
        assert_eq!(result.nodes.len(), 1);
        let checkout_id = result.nodes[0].id.clone();
        assert_eq!(result.edges[0].source_id, checkout_id);
        assert_eq!(result.edges[0].target_id, checkout_id);
    }

    #[test]
    fn does_not_handle_shapes_missing_triples() {
        let input = json!({"components": {"POD": ["p1"]}});
        assert!(!ComponentDiscoveryExtractor.can_handle(&input));
    }
}
