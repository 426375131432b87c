//! A flat map of service name to RED metrics, with no edges (spec §4.4
//! "Service Summary").

use super::Extractor;
use kg_core::dedup::NodeSink;
use kg_core::types::{make_node_id, ExtractionResult, Node, Statistic};
use serde_json::Value as Json;

pub struct ServiceSummaryExtractor;

impl Extractor for ServiceSummaryExtractor {
    fn name(&self) -> &'static str {
        "service_summary"
    }

    fn can_handle(&self, parsed: &Json) -> bool {
        let Some(obj) = parsed.as_object() else { return false };
        if obj.is_empty() {
            return false;
        }
        obj.values().all(|v| {
            v.as_object()
                .map(|entry| entry.contains_key("ServiceName") || entry.contains_key("Throughput"))
                .unwrap_or(false)
        })
    }

    fn extract(&self, parsed: &Json) -> ExtractionResult {
        let obj = parsed.as_object().expect("can_handle checked this is an object");
        let mut sink = NodeSink::new();
        let mut stats = Vec::new();

        for (key, entry) in obj {
            let Some(entry) = entry.as_object() else { continue };
            let name = entry.get("ServiceName").and_then(|v| v.as_str()).unwrap_or(key);
            let id = make_node_id("Service", &[name]);
            sink.push(Node::new(id.clone(), "Service", name));

            for (field, unit) in [("Throughput", "req/s"), ("ErrorRate", "errors/s"), ("ResponseTime", "ms")] {
                if let Some(value) = entry.get(field).and_then(|v| v.as_f64()) {
                    stats.push(Statistic {
                        node_id: id.clone(),
                        metric_name: field.to_string(),
                        value,
                        unit: Some(unit.to_string()),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }

        ExtractionResult {
            nodes: sink.into_vec(),
            edges: Vec::new(),
            stats,
            confidence: 0.85,
            pattern: self.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_one_service_per_entry() {
        let input = json!({
            "checkout": {"Throughput": 100.0, "ErrorRate": 1.2},
            "payments": {"ServiceName": "payments-v2", "Throughput": 50.0}
        });
        let extractor = ServiceSummaryExtractor;
        assert!(extractor.can_handle(&input));
        let result = extractor.extract(&input);
        assert_eq!(result.nodes.len(), 2);
        assert!(result.edges.is_empty());
        assert_eq!(result.confidence, 0.85);
    }

    #[test]
    fn rejects_shapes_without_service_markers() {
        let input = json!({"checkout": {"region": "us-east"}});
        assert!(!ServiceSummaryExtractor.can_handle(&input));
    }
}
