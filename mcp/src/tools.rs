//! Tool registry (spec §4.9): names, descriptions, and input schemas for
//! every tool this server exposes through `tools/list`.

use serde_json::{json, Value as Json};

fn time_window_properties() -> Json {
    json!({
        "start_time_iso": {
            "type": "string",
            "description": "Window start, pattern YYYY-MM-DD HH:MM:SS. Defaults to end_time_iso minus lookback_minutes."
        },
        "end_time_iso": {
            "type": "string",
            "description": "Window end, pattern YYYY-MM-DD HH:MM:SS. Defaults to now."
        },
        "lookback_minutes": {
            "type": "integer",
            "description": "Minutes to look back from end_time_iso when start_time_iso is omitted. Default 60, max 1440."
        }
    })
}

pub fn all_tool_definitions() -> Vec<(&'static str, &'static str, Json)> {
    vec![
        (
            "ingest",
            "Persist nodes, edges, statistics, and events. If raw_text is given, the extraction pipeline runs first and its output is merged into the explicit arrays before anything is stored.",
            json!({
                "type": "object",
                "properties": {
                    "nodes": {"type": "array", "items": {"type": "object"}},
                    "edges": {"type": "array", "items": {"type": "object"}},
                    "stats": {"type": "array", "items": {"type": "object"}},
                    "events": {"type": "array", "items": {"type": "object"}},
                    "raw_text": {"type": "string", "description": "Unstructured or semi-structured input to run through the extraction pipeline."}
                }
            }),
        ),
        (
            "search",
            "Full-text search across nodes and notes, with graph context (edges, stats, recent high-severity events, linked notes) for each matched node.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["query"]
            }),
        ),
        (
            "list_schemas",
            "List every registered schema, builtin and user-defined.",
            json!({"type": "object", "properties": {}}),
        ),
        (
            "define_schema",
            "Register a user-defined schema. Fails if a schema of the same name is a builtin.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "node_types": {"type": "array", "items": {"type": "string"}},
                    "edge_patterns": {"type": "array", "items": {"type": "string"}},
                    "description": {"type": "string"}
                },
                "required": ["name", "node_types", "edge_patterns"]
            }),
        ),
        (
            "add_service_to_schema",
            "Idempotently add a service name to a schema's scope, removing the '*' wildcard if present.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "service": {"type": "string"}
                },
                "required": ["name", "service"]
            }),
        ),
        (
            "remove_service_from_schema",
            "Remove a service name from a schema's scope. Errors if the service is not currently associated.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "service": {"type": "string"}
                },
                "required": ["name", "service"]
            }),
        ),
        (
            "add_note",
            "Attach a note to one or more nodes and/or edges. Requires a non-empty title and body, and at least one link.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "body": {"type": "string"},
                    "node_ids": {"type": "array", "items": {"type": "string"}},
                    "edge_refs": {"type": "array", "items": {"type": "object"}}
                },
                "required": ["title", "body"]
            }),
        ),
        (
            "get_note",
            "Fetch a note by id.",
            json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}),
        ),
        (
            "delete_note",
            "Delete a note by id.",
            json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}),
        ),
        (
            "get_topology",
            "Bounded outgoing-edge traversal from a root node.",
            json!({
                "type": "object",
                "properties": {
                    "root_id": {"type": "string"},
                    "depth": {"type": "integer"}
                },
                "required": ["root_id", "depth"]
            }),
        ),
        (
            "get_logs",
            "Proxy log query to the observability backend over the given time window.",
            json!({"type": "object", "properties": time_window_properties(), "additionalProperties": true}),
        ),
        (
            "get_traces",
            "Proxy trace query to the observability backend over the given time window.",
            json!({"type": "object", "properties": time_window_properties(), "additionalProperties": true}),
        ),
        (
            "get_metrics",
            "Proxy metrics query to the observability backend over the given time window.",
            json!({"type": "object", "properties": time_window_properties(), "additionalProperties": true}),
        ),
        (
            "get_apm_summary",
            "Proxy an APM summary query to the observability backend over the given time window.",
            json!({"type": "object", "properties": time_window_properties(), "additionalProperties": true}),
        ),
        (
            "get_alerts",
            "Proxy an alerts query to the observability backend over the given time window.",
            json!({"type": "object", "properties": time_window_properties(), "additionalProperties": true}),
        ),
        (
            "get_change_events",
            "Proxy a change-events query to the observability backend over the given time window.",
            json!({"type": "object", "properties": time_window_properties(), "additionalProperties": true}),
        ),
    ]
}
