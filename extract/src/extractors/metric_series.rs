//! Prometheus-shaped metric series array; delegates per-series work to the
//! label-rule engine (spec §4.4 "Metric Series (Prometheus)", §4.5).

use super::Extractor;
use crate::labels::{json_object_to_label_map, process_series};
use kg_core::dedup::NodeSink;
use kg_core::types::ExtractionResult;
use serde_json::Value as Json;

pub struct MetricSeriesExtractor;

impl Extractor for MetricSeriesExtractor {
    fn name(&self) -> &'static str {
        "metric_series"
    }

    fn can_handle(&self, parsed: &Json) -> bool {
        let Some(arr) = parsed.as_array() else { return false };
        let Some(first) = arr.first() else { return false };
        let Some(first_obj) = first.as_object() else { return false };
        matches!(first_obj.get("metric"), Some(Json::Object(_)))
            && (first_obj.contains_key("value") || first_obj.contains_key("values"))
    }

    fn extract(&self, parsed: &Json) -> ExtractionResult {
        let series = parsed.as_array().expect("can_handle checked this is an array");
        let mut sink = NodeSink::new();
        let mut edges = Vec::new();
        let mut stats = Vec::new();

        for entry in series {
            let Some(entry_obj) = entry.as_object() else { continue };
            let Some(metric) = entry_obj.get("metric") else { continue };
            let Some(value) = select_value(entry_obj) else { continue };

            let (metric_name, labels) = json_object_to_label_map(metric);
            let result = process_series(&metric_name, &labels, value);
            sink.extend(result.nodes);
            edges.extend(result.edges);
            if let Some(stat) = result.stat {
                stats.push(stat);
            }
        }

        let confidence = if stats.is_empty() { 0.2 } else { 0.9 };
        ExtractionResult {
            nodes: sink.into_vec(),
            edges: dedup_edges(edges),
            stats,
            confidence,
            pattern: self.name().to_string(),
        }
    }
}

/// Instant form is `"value": [ts, "123.4"]`; range form is
/// `"values": [[ts, "v"], ...]`, and the most recent pair wins.
fn select_value(entry: &serde_json::Map<String, Json>) -> Option<f64> {
    if let Some(Json::Array(pair)) = entry.get("value") {
        return pair.get(1).and_then(parse_value_string);
    }
    if let Some(Json::Array(values)) = entry.get("values") {
        return values.last().and_then(|pair| pair.as_array()).and_then(|pair| pair.get(1)).and_then(parse_value_string);
    }
    None
}

fn parse_value_string(v: &Json) -> Option<f64> {
    match v {
        Json::String(s) => s.parse::<f64>().ok(),
        Json::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn dedup_edges(edges: Vec<kg_core::types::Edge>) -> Vec<kg_core::types::Edge> {
    let mut seen = std::collections::HashSet::new();
    edges
        .into_iter()
        .filter(|e| seen.insert((e.source_id.clone(), e.target_id.clone(), e.relation.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handles_instant_vector_shape() {
        let input = json!([
            {"metric": {"__name__": "cpu_usage", "namespace": "a", "pod": "b"}, "value": [1700000000, "0.5"]}
        ]);
        let extractor = MetricSeriesExtractor;
        assert!(extractor.can_handle(&input));
        let result = extractor.extract(&input);
        assert_eq!(result.stats.len(), 1);
        assert_eq!(result.stats[0].value, 0.5);
    }

    #[test]
    fn two_series_sharing_pod_dedup_the_shared_edge() {
        let input = json!([
            {"metric": {"__name__": "cpu", "namespace": "a", "pod": "b", "container": "c1"}, "value": [1, "1"]},
            {"metric": {"__name__": "cpu", "namespace": "a", "pod": "b", "container": "c2"}, "value": [1, "2"]}
        ]);
        let result = MetricSeriesExtractor.extract(&input);
        assert_eq!(result.nodes.len(), 4); // namespace, pod, container1, container2
        assert_eq!(result.edges.len(), 3); // namespace->pod once, pod->container1, pod->container2
    }

    #[test]
    fn range_vector_uses_most_recent_pair() {
        let input = json!([
            {"metric": {"__name__": "queue_depth", "service": "x"}, "values": [[1, "10"], [2, "42"]]}
        ]);
        let result = MetricSeriesExtractor.extract(&input);
        assert_eq!(result.stats[0].value, 42.0);
    }
}
