//! Service-centric dependency shape: a root service plus peer maps for
//! incoming/outgoing calls, databases, and messaging systems (spec §4.4
//! "Dependency Graph").

use super::{top_level_env, Extractor};
use kg_core::dedup::NodeSink;
use kg_core::types::{make_node_id, Edge, ExtractionResult, Node, Statistic};
use serde_json::Value as Json;

pub struct DependencyGraphExtractor;

impl Extractor for DependencyGraphExtractor {
    fn name(&self) -> &'static str {
        "dependency_graph"
    }

    fn can_handle(&self, parsed: &Json) -> bool {
        let Some(obj) = parsed.as_object() else { return false };
        obj.contains_key("service_name")
            && (matches!(obj.get("incoming"), Some(Json::Object(_)))
                || matches!(obj.get("outgoing"), Some(Json::Object(_)))
                || matches!(obj.get("databases"), Some(Json::Object(_))))
    }

    fn extract(&self, parsed: &Json) -> ExtractionResult {
        let obj = parsed.as_object().expect("can_handle checked this is an object");
        let service_name = obj.get("service_name").and_then(|v| v.as_str()).unwrap_or("");
        let env = top_level_env(obj);

        let root_id = make_node_id("Service", &[service_name]);
        let mut sink = NodeSink::new();
        sink.push(with_env(Node::new(root_id.clone(), "Service", service_name), &env));

        let mut edges = Vec::new();
        let mut stats = Vec::new();

        if let Some(Json::Object(incoming)) = obj.get("incoming") {
            for (peer, metrics) in incoming {
                let peer_id = make_node_id("Service", &[peer]);
                sink.push(with_env(Node::new(peer_id.clone(), "Service", peer), &env));
                edges.push(Edge::new(peer_id, "CALLS", root_id.clone()));
                collect_stats(peer, metrics, &root_id, &mut stats);
            }
        }

        if let Some(Json::Object(outgoing)) = obj.get("outgoing") {
            for (peer, metrics) in outgoing {
                let peer_id = make_node_id("Service", &[peer]);
                sink.push(with_env(Node::new(peer_id.clone(), "Service", peer), &env));
                edges.push(Edge::new(root_id.clone(), "CALLS", peer_id));
                collect_stats(peer, metrics, &root_id, &mut stats);
            }
        }

        if let Some(Json::Object(databases)) = obj.get("databases") {
            for (peer, metrics) in databases {
                let peer_id = make_node_id("DataStoreInstance", &[peer]);
                sink.push(with_env(Node::new(peer_id.clone(), "DataStoreInstance", peer), &env));
                edges.push(Edge::new(root_id.clone(), "CONNECTS_TO", peer_id));
                collect_stats(peer, metrics, &root_id, &mut stats);
            }
        }

        if let Some(Json::Object(messaging)) = obj.get("messaging_systems") {
            for (peer, metrics) in messaging {
                let peer_id = make_node_id("KafkaTopic", &[peer]);
                sink.push(with_env(Node::new(peer_id.clone(), "KafkaTopic", peer), &env));
                edges.push(Edge::new(root_id.clone(), "PRODUCES_TO", peer_id));
                collect_stats(peer, metrics, &root_id, &mut stats);
            }
        }

        let confidence = if service_name.is_empty() { 0.1 } else { 0.9 };
        ExtractionResult {
            nodes: sink.into_vec(),
            edges,
            stats,
            confidence,
            pattern: self.name().to_string(),
        }
    }
}

fn with_env(node: Node, env: &Option<String>) -> Node {
    match env {
        Some(e) => node.with_env(e.clone()),
        None => node,
    }
}

fn collect_stats(peer: &str, metrics: &Json, root_id: &str, out: &mut Vec<Statistic>) {
    let Some(fields) = metrics.as_object() else { return };
    for (field, value) in fields {
        let Some(value) = value.as_f64() else { continue };
        out.push(Statistic {
            node_id: root_id.to_string(),
            metric_name: format!("{peer}->root.{field}"),
            value,
            unit: unit_for_field(field),
            timestamp: chrono::Utc::now(),
        });
    }
}

fn unit_for_field(field: &str) -> Option<String> {
    let normalized = field.to_lowercase().replace('_', "");
    match normalized.as_str() {
        "throughput" => Some("req/s".to_string()),
        "errorrate" => Some("errors/s".to_string()),
        "errorpercent" => Some("%".to_string()),
        "responsetime" => Some("ms".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s1_scenario_produces_expected_graph() {
        let input = json!({
            "service_name": "payment-api",
            "incoming": {"checkout": {"Throughput": 100}},
            "outgoing": {},
            "databases": {"postgres": {"Throughput": 200}}
        });
        let extractor = DependencyGraphExtractor;
        assert!(extractor.can_handle(&input));
        let result = extractor.extract(&input);
        assert_eq!(result.nodes.len(), 3);
        assert_eq!(result.edges.len(), 2);
        assert_eq!(result.stats.len(), 2);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn empty_service_name_lowers_confidence() {
        let input = json!({"service_name": "", "incoming": {}});
        let result = DependencyGraphExtractor.extract(&input);
        assert_eq!(result.confidence, 0.1);
    }
}
