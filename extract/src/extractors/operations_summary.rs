//! A service plus its list of operations, each with RED-style metrics and
//! optional datastore/messaging dependencies (spec §4.4 "Operations
//! Summary").

use super::{top_level_env, Extractor};
use kg_core::dedup::NodeSink;
use kg_core::types::{make_node_id, Edge, ExtractionResult, Node, Statistic};
use serde_json::Value as Json;

pub struct OperationsSummaryExtractor;

impl Extractor for OperationsSummaryExtractor {
    fn name(&self) -> &'static str {
        "operations_summary"
    }

    fn can_handle(&self, parsed: &Json) -> bool {
        let Some(obj) = parsed.as_object() else { return false };
        matches!(obj.get("service_name"), Some(Json::String(_))) && matches!(obj.get("operations"), Some(Json::Array(_)))
    }

    fn extract(&self, parsed: &Json) -> ExtractionResult {
        let obj = parsed.as_object().expect("can_handle checked this is an object");
        let service_name = obj.get("service_name").and_then(|v| v.as_str()).unwrap_or("");
        let env = top_level_env(obj);
        let operations = obj.get("operations").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let root_id = make_node_id("Service", &[service_name]);
        let mut sink = NodeSink::new();
        sink.push(with_env(Node::new(root_id.clone(), "Service", service_name), &env));

        let mut edges = Vec::new();
        let mut stats = Vec::new();

        for op in &operations {
            let Some(op_obj) = op.as_object() else { continue };
            let op_name = op_obj
                .get("operation")
                .or_else(|| op_obj.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            let endpoint_id = make_node_id("HTTPEndpoint", &[service_name, op_name]);
            sink.push(with_env(Node::new(endpoint_id.clone(), "HTTPEndpoint", op_name), &env));
            edges.push(Edge::new(root_id.clone(), "EXPOSES", endpoint_id.clone()));

            if let Some(db) = op_obj.get("db_system").and_then(|v| v.as_str()) {
                let db_id = make_node_id("DataStoreInstance", &[db]);
                sink.push(with_env(Node::new(db_id.clone(), "DataStoreInstance", db), &env));
                edges.push(Edge::new(root_id.clone(), "CONNECTS_TO", db_id));
            }
            if let Some(topic) = op_obj.get("messaging_system").and_then(|v| v.as_str()) {
                let topic_id = make_node_id("KafkaTopic", &[topic]);
                sink.push(with_env(Node::new(topic_id.clone(), "KafkaTopic", topic), &env));
                edges.push(Edge::new(root_id.clone(), "PRODUCES_TO", topic_id));
            }

            for field in ["throughput", "error_rate", "error_percent"] {
                if let Some(value) = op_obj.get(field).and_then(|v| v.as_f64()) {
                    stats.push(Statistic {
                        node_id: endpoint_id.clone(),
                        metric_name: field.to_string(),
                        value,
                        unit: unit_for_field(field),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            if let Some(Json::Object(response_time)) = op_obj.get("response_time") {
                for (percentile, value) in response_time {
                    if let Some(value) = value.as_f64() {
                        stats.push(Statistic {
                            node_id: endpoint_id.clone(),
                            metric_name: format!("response_time.{percentile}"),
                            value,
                            unit: Some("ms".to_string()),
                            timestamp: chrono::Utc::now(),
                        });
                    }
                }
            }
        }

        let confidence = if operations.is_empty() { 0.3 } else { 0.9 };
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

fn unit_for_field(field: &str) -> Option<String> {
    match field {
        "throughput" => Some("req/s".to_string()),
        "error_rate" => Some("errors/s".to_string()),
        "error_percent" => Some("%".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_endpoint_per_operation() {
        let input = json!({
            "service_name": "checkout",
            "operations": [
                {"operation": "GET /cart", "throughput": 50.0, "db_system": "postgres",
                 "response_time": {"p50": 12.0, "p95": 40.0}}
            ]
        });
        let extractor = OperationsSummaryExtractor;
        assert!(extractor.can_handle(&input));
        let result = extractor.extract(&input);
        assert_eq!(result.nodes.len(), 3); // service, endpoint, db
        assert_eq!(result.edges.len(), 2);
        assert_eq!(result.stats.len(), 3); // throughput, p50, p95
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn empty_operations_lowers_confidence() {
        let input = json!({"service_name": "checkout", "operations": []});
        let result = OperationsSummaryExtractor.extract(&input);
        assert_eq!(result.confidence, 0.3);
    }
}
