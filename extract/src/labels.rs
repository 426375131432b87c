//! Label-Rule Engine (C5): canonical label resolution, entity resolution,
//! edge inference, stat-target selection, qualifier suffixing, and
//! environment detection for a single Prometheus-shaped metric series.

use kg_core::dedup::NodeSink;
use kg_core::types::{make_node_id, Edge, Node, Statistic};
use serde_json::Value as Json;
use std::collections::BTreeMap;

struct EntityRule {
    canonical: &'static str,
    node_type: &'static str,
    scope: &'static [&'static str],
    priority: u8,
    metric_prefix_constraint: Option<&'static str>,
}

const ALIASES: &[(&str, &[&str])] = &[
    ("namespace", &["namespace", "k8s_namespace_name"]),
    ("deployment", &["deployment", "k8s_deployment_name"]),
    ("service", &["service", "service_name", "job"]),
    ("pod", &["pod", "k8s_pod_name"]),
    ("container", &["container", "k8s_container_name"]),
    ("node", &["node", "k8s_node_name"]),
    ("instance", &["instance"]),
    ("topic", &["topic", "redpanda_topic"]),
    ("consumergroup", &["consumergroup", "consumer_group"]),
];

const ENTITY_RULES: &[EntityRule] = &[
    EntityRule { canonical: "namespace", node_type: "Namespace", scope: &[], priority: 1, metric_prefix_constraint: None },
    EntityRule { canonical: "node", node_type: "Node", scope: &[], priority: 2, metric_prefix_constraint: None },
    EntityRule { canonical: "deployment", node_type: "Deployment", scope: &["namespace"], priority: 2, metric_prefix_constraint: None },
    EntityRule { canonical: "service", node_type: "Service", scope: &[], priority: 2, metric_prefix_constraint: None },
    EntityRule { canonical: "topic", node_type: "KafkaTopic", scope: &[], priority: 2, metric_prefix_constraint: None },
    EntityRule { canonical: "pod", node_type: "Pod", scope: &["namespace"], priority: 3, metric_prefix_constraint: None },
    EntityRule { canonical: "consumergroup", node_type: "ConsumerGroup", scope: &["topic"], priority: 3, metric_prefix_constraint: None },
    EntityRule { canonical: "container", node_type: "Container", scope: &["namespace", "pod"], priority: 4, metric_prefix_constraint: None },
    EntityRule { canonical: "instance", node_type: "Instance", scope: &[], priority: 1, metric_prefix_constraint: Some("node_") },
];

/// `(source_canonical, target_canonical, relation)`.
const EDGE_RULES: &[(&str, &str, &str)] = &[
    ("namespace", "pod", "CONTAINS"),
    ("deployment", "pod", "MANAGES"),
    ("pod", "container", "RUNS"),
    ("pod", "node", "RUNS_ON"),
    ("consumergroup", "topic", "CONSUMES_FROM"),
];

const ENV_PRIORITY: &[&str] = &["environment", "deployment_environment", "env", "cluster"];

const QUALIFIER_LABELS: &[&str] = &["resource", "quantile", "le", "mode"];

fn resolve_label(labels: &BTreeMap<String, String>, canonical: &str) -> Option<String> {
    let aliases = ALIASES
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, a)| *a)
        .unwrap_or(&[]);
    for alias in aliases {
        if let Some(v) = labels.get(*alias) {
            if !v.is_empty() {
                return Some(v.clone());
            }
        }
    }
    if aliases.is_empty() {
        if let Some(v) = labels.get(canonical) {
            if !v.is_empty() {
                return Some(v.clone());
            }
        }
    }
    None
}

struct ResolvedEntity {
    canonical: &'static str,
    node_type: &'static str,
    id: String,
    priority: u8,
}

fn resolve_entities(labels: &BTreeMap<String, String>, metric_name: &str) -> Vec<ResolvedEntity> {
    let mut resolved: Vec<ResolvedEntity> = Vec::new();
    for rule in ENTITY_RULES {
        if let Some(prefix) = rule.metric_prefix_constraint {
            if !metric_name.starts_with(prefix) {
                continue;
            }
        }
        let Some(value) = resolve_label(labels, rule.canonical) else { continue };

        // Scope labels must already be resolved as entities for this rule
        // to fire (container needs namespace+pod resolved first, etc).
        let mut key_parts: Vec<String> = Vec::new();
        let mut scope_ok = true;
        for scope_label in rule.scope {
            match resolved.iter().find(|e| e.canonical == *scope_label) {
                Some(_) => match resolve_label(labels, scope_label) {
                    Some(v) => key_parts.push(v),
                    None => {
                        scope_ok = false;
                        break;
                    }
                },
                None => {
                    scope_ok = false;
                    break;
                }
            }
        }
        if !scope_ok {
            continue;
        }
        key_parts.push(value);

        let key_refs: Vec<&str> = key_parts.iter().map(String::as_str).collect();
        let id = make_node_id(rule.node_type, &key_refs);
        resolved.push(ResolvedEntity {
            canonical: rule.canonical,
            node_type: rule.node_type,
            id,
            priority: rule.priority,
        });
    }
    resolved
}

/// The outcome of processing one metric series: nodes/edges it produced
/// plus the single statistic, already attached to its chosen target node.
pub struct SeriesResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stat: Option<Statistic>,
}

fn qualify_metric_name(base: &str, labels: &BTreeMap<String, String>) -> String {
    let mut name = base.to_string();
    for qualifier in QUALIFIER_LABELS {
        if let Some(v) = labels.get(*qualifier) {
            if !v.is_empty() {
                name.push(':');
                name.push_str(v);
            }
        }
    }
    name
}

fn detect_env(labels: &BTreeMap<String, String>) -> Option<String> {
    for key in ENV_PRIORITY {
        if let Some(v) = labels.get(*key) {
            if !v.is_empty() {
                return Some(v.clone());
            }
        }
    }
    None
}

fn legacy_stat_target(labels: &BTreeMap<String, String>, metric_name: &str) -> String {
    for key in ["service_name", "service", "job", "instance"] {
        if let Some(v) = labels.get(key) {
            if !v.is_empty() {
                return v.clone();
            }
        }
    }
    format!("metric:{metric_name}")
}

/// Processes one series: `metric_name` is the `__name__` value, `labels`
/// are the remaining entries of the `metric` map, `value` is the already
/// value-selected (instant-or-most-recent-range) scalar.
pub fn process_series(metric_name: &str, labels: &BTreeMap<String, String>, value: f64) -> SeriesResult {
    let env = detect_env(labels);
    let entities = resolve_entities(labels, metric_name);

    let mut sink = NodeSink::new();
    for entity in &entities {
        let mut node = Node::new(entity.id.clone(), entity.node_type, entity.id.clone());
        if let Some(env) = &env {
            node = node.with_env(env.clone());
        }
        sink.push(node);
    }

    let mut edges = Vec::new();
    for (src_canon, dst_canon, relation) in EDGE_RULES {
        let src = entities.iter().find(|e| e.canonical == *src_canon);
        let dst = entities.iter().find(|e| e.canonical == *dst_canon);
        if let (Some(src), Some(dst)) = (src, dst) {
            edges.push(Edge::new(src.id.clone(), *relation, dst.id.clone()));
        }
    }

    let target_id = entities
        .iter()
        .max_by_key(|e| e.priority)
        .map(|e| e.id.clone())
        .unwrap_or_else(|| legacy_stat_target(labels, metric_name));

    let qualified_name = qualify_metric_name(metric_name, labels);
    let unit = labels.get("unit").cloned();

    let stat = Some(Statistic {
        node_id: target_id,
        metric_name: qualified_name,
        value,
        unit,
        timestamp: chrono::Utc::now(),
    });

    SeriesResult {
        nodes: sink.into_vec(),
        edges,
        stat,
    }
}

pub fn json_object_to_label_map(metric: &Json) -> (String, BTreeMap<String, String>) {
    let mut labels = BTreeMap::new();
    let mut metric_name = "unknown".to_string();
    if let Json::Object(map) = metric {
        for (k, v) in map {
            let as_str = match v {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            if k == "__name__" {
                metric_name = as_str;
            } else {
                labels.insert(k.clone(), as_str);
            }
        }
    }
    (metric_name, labels)
}
