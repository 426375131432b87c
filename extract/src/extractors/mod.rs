//! Extractors (C4) and their registry. The registry holds extractors in
//! priority order and returns the first whose `can_handle` matches (spec
//! §4.4, §9 Design Notes "Polymorphism of extractors").

mod component_discovery;
mod dependency_graph;
mod metric_series;
mod operations_summary;
mod service_summary;

use kg_core::types::ExtractionResult;
use serde_json::Value as Json;

/// A recognizer that converts one specific shape of parsed data into graph
/// elements.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_handle(&self, parsed: &Json) -> bool;
    fn extract(&self, parsed: &Json) -> ExtractionResult;
}

pub struct Registry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Registry {
    /// Built in priority order exactly as spec §4.4 lists them: component
    /// discovery first (also the Testable Property #9 tie-break winner),
    /// metric series last (array shape, strictly more specific parse
    /// precondition than the object-shaped ones ahead of it).
    pub fn with_builtins() -> Self {
        Self {
            extractors: vec![
                Box::new(component_discovery::ComponentDiscoveryExtractor),
                Box::new(dependency_graph::DependencyGraphExtractor),
                Box::new(operations_summary::OperationsSummaryExtractor),
                Box::new(service_summary::ServiceSummaryExtractor),
                Box::new(metric_series::MetricSeriesExtractor),
            ],
        }
    }

    pub fn try_extract(&self, parsed: &Json) -> Option<ExtractionResult> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(parsed))
            .map(|e| e.extract(parsed))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Normalizes a component-discovery `UPPER` type tag to PascalCase,
/// special-casing the handful of multi-word domain types; falls back to a
/// straight title-case of the whole token.
pub(crate) fn normalize_component_type(raw: &str) -> String {
    match raw.to_uppercase().as_str() {
        "POD" => "Pod".to_string(),
        "SERVICE" => "Service".to_string(),
        "NAMESPACE" => "Namespace".to_string(),
        "DEPLOYMENT" => "Deployment".to_string(),
        "CONTAINER" => "Container".to_string(),
        "NODE" => "Node".to_string(),
        "DATASTOREINSTANCE" => "DataStoreInstance".to_string(),
        "KAFKATOPIC" => "KafkaTopic".to_string(),
        "HTTPENDPOINT" => "HTTPEndpoint".to_string(),
        other => title_case(other),
    }
}

fn title_case(upper: &str) -> String {
    let mut chars = upper.chars();
    match chars.next() {
        Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

pub(crate) fn top_level_env(obj: &serde_json::Map<String, Json>) -> Option<String> {
    obj.get("env").and_then(|v| v.as_str()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_types() {
        assert_eq!(normalize_component_type("POD"), "Pod");
        assert_eq!(normalize_component_type("DATASTOREINSTANCE"), "DataStoreInstance");
    }

    #[test]
    fn falls_back_to_title_case() {
        assert_eq!(normalize_component_type("WIDGET"), "Widget");
    }
}
