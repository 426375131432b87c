//! Tool dispatch (spec §4.9): `tools/call` lands here, args get parsed out
//! of the JSON-RPC params, the matching `GraphStore`/pipeline/backend call
//! runs, and the typed result or `CoreError` becomes a `ToolCallResult`.

use crate::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallResult, INVALID_PARAMS, METHOD_NOT_FOUND,
};
use crate::{prompts, tools};
use kg_backend::{resolve_time_window, BackendClient, ProxyTool, TimeWindowArgs};
use kg_core::errors::{CoreError, StorageError, ValidationError};
use kg_core::traits::{GraphStore, IngestBatch};
use kg_core::types::{Blueprint, Edge, EdgeRef, Event, Node, Note, Schema, Statistic};
use kg_extract::Pipeline;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as Json};
use std::sync::Arc;
use tracing::Instrument;

pub struct McpServer {
    store: Arc<dyn GraphStore>,
    pipeline: Arc<Pipeline>,
    backend: Arc<BackendClient>,
}

impl McpServer {
    pub fn new(store: Arc<dyn GraphStore>, pipeline: Arc<Pipeline>, backend: Arc<BackendClient>) -> Self {
        Self { store, pipeline, backend }
    }

    pub async fn handle(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let method = req.method.clone();
        let id = req.id.clone();
        let span = tracing::info_span!("jsonrpc_request", method = %method, id = ?id);
        async move {
            if req.is_notification() {
                if method != "notifications/initialized" {
                    tracing::warn!(method = %method, "ignoring notification for unrecognized method");
                }
                return None;
            }
            let id = id.unwrap_or(Json::Null);
            let response = match method.as_str() {
                "initialize" => JsonRpcResponse::success(id, initialize_result()),
                "ping" => JsonRpcResponse::success(id, json!({})),
                "tools/list" => JsonRpcResponse::success(id, tools_list_result()),
                "tools/call" => self.handle_tools_call(id, req.params).await,
                "prompts/list" => JsonRpcResponse::success(id, prompts::list()),
                "prompts/get" => handle_prompts_get(id, &req.params),
                other => JsonRpcResponse::failure(id, JsonRpcError::new(METHOD_NOT_FOUND, format!("unknown method: {other}"))),
            };
            Some(response)
        }
        .instrument(span)
        .await
    }

    async fn handle_tools_call(&self, id: Json, params: Json) -> JsonRpcResponse {
        let name = match params.get("name").and_then(Json::as_str) {
            Some(n) => n.to_string(),
            None => return JsonRpcResponse::failure(id, JsonRpcError::new(INVALID_PARAMS, "missing tool name")),
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let result = self.dispatch_tool(&name, arguments).await;
        JsonRpcResponse::success(id, serde_json::to_value(result).expect("ToolCallResult always serializes"))
    }

    async fn dispatch_tool(&self, name: &str, args: Json) -> ToolCallResult {
        let span = tracing::info_span!("tool_call", tool = %name);
        let outcome = async move {
            match name {
                "ingest" => self.tool_ingest(args).await,
                "search" => self.tool_search(args).await,
                "list_schemas" => self.tool_list_schemas().await,
                "define_schema" => self.tool_define_schema(args).await,
                "add_service_to_schema" => self.tool_add_service_to_schema(args).await,
                "remove_service_from_schema" => self.tool_remove_service_from_schema(args).await,
                "add_note" => self.tool_add_note(args).await,
                "get_note" => self.tool_get_note(args).await,
                "delete_note" => self.tool_delete_note(args).await,
                "get_topology" => self.tool_get_topology(args).await,
                "get_logs" => self.tool_proxy(ProxyTool::Logs, args).await,
                "get_traces" => self.tool_proxy(ProxyTool::Traces, args).await,
                "get_metrics" => self.tool_proxy(ProxyTool::Metrics, args).await,
                "get_apm_summary" => self.tool_proxy(ProxyTool::ApmSummary, args).await,
                "get_alerts" => self.tool_proxy(ProxyTool::Alerts, args).await,
                "get_change_events" => self.tool_proxy(ProxyTool::ChangeEvents, args).await,
                other => Err(CoreError::Validation(ValidationError::UnknownTool(other.to_string()))),
            }
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(value) => ToolCallResult::ok_json(value),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                ToolCallResult::error(e.to_string())
            }
        }
    }

    async fn tool_ingest(&self, args: Json) -> Result<Json, CoreError> {
        let mut nodes: Vec<Node> = parse_array(&args, "nodes")?;
        let mut edges: Vec<Edge> = parse_array(&args, "edges")?;
        let mut stats: Vec<Statistic> = parse_array(&args, "stats")?;
        let events: Vec<Event> = parse_array(&args, "events")?;

        let extraction_info = match args.get("raw_text").and_then(Json::as_str) {
            Some(raw) if !raw.is_empty() => {
                let extraction = self.pipeline.process(raw)?;
                let info = json!({"pattern": extraction.pattern, "confidence": extraction.confidence});
                nodes.extend(extraction.nodes);
                edges.extend(extraction.edges);
                stats.extend(extraction.stats);
                Some(info)
            }
            _ => None,
        };

        let schemas = self.store.list_schemas().await?;
        let input_sig = kg_schema::prelude::input_signature(&nodes, &edges);
        let input_types = kg_schema::prelude::input_node_types(&nodes);
        let matched = kg_schema::prelude::match_schemas(&input_sig, &input_types, &schemas);

        let batch = IngestBatch { nodes, edges, stats, events };
        let ingested = !batch.is_empty();
        if ingested {
            self.store.ingest(batch).await?;
        }

        let mut response = json!({
            "ingested": ingested,
            "matched_schemas": matched.into_iter().map(|s| json!({"name": s.name, "score": s.score})).collect::<Vec<_>>(),
        });
        if let Some(info) = extraction_info {
            response["extraction"] = info;
        }
        Ok(response)
    }

    async fn tool_search(&self, args: Json) -> Result<Json, CoreError> {
        let query = str_arg(&args, "query")?;
        let limit = args.get("limit").and_then(Json::as_u64).unwrap_or(10) as usize;
        let result = self.store.search(&query, limit).await?;
        Ok(serde_json::to_value(result).expect("SearchResult always serializes"))
    }

    async fn tool_list_schemas(&self) -> Result<Json, CoreError> {
        let schemas = self.store.list_schemas().await?;
        Ok(serde_json::to_value(schemas).expect("Schema always serializes"))
    }

    async fn tool_define_schema(&self, args: Json) -> Result<Json, CoreError> {
        let name = str_arg(&args, "name")?;
        let node_types: Vec<String> = parse_array(&args, "node_types")?;
        let edge_patterns: Vec<String> = parse_array(&args, "edge_patterns")?;
        let description = args.get("description").and_then(Json::as_str).map(String::from);

        let schema = Schema {
            name: name.clone(),
            blueprint: Blueprint { node_types, edge_patterns, field_hints: Default::default() },
            description,
            builtin: false,
            environments: Vec::new(),
            services: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        self.store.define_schema(schema).await?;
        Ok(json!({"defined": name}))
    }

    async fn tool_add_service_to_schema(&self, args: Json) -> Result<Json, CoreError> {
        let name = str_arg(&args, "name")?;
        let service = str_arg(&args, "service")?;
        self.store.add_service_to_schema(&name, &service).await?;
        Ok(json!({"name": name, "service": service, "added": true}))
    }

    async fn tool_remove_service_from_schema(&self, args: Json) -> Result<Json, CoreError> {
        let name = str_arg(&args, "name")?;
        let service = str_arg(&args, "service")?;
        self.store.remove_service_from_schema(&name, &service).await?;
        Ok(json!({"name": name, "service": service, "removed": true}))
    }

    async fn tool_add_note(&self, args: Json) -> Result<Json, CoreError> {
        let title = str_arg(&args, "title")?;
        let body = str_arg(&args, "body")?;
        if title.trim().is_empty() {
            return Err(CoreError::Validation(ValidationError::Other("title must not be empty".into())));
        }
        if body.trim().is_empty() {
            return Err(CoreError::Validation(ValidationError::Other("body must not be empty".into())));
        }
        let node_ids: Vec<String> = parse_array(&args, "node_ids")?;
        let edge_refs: Vec<EdgeRef> = parse_array(&args, "edge_refs")?;
        if node_ids.is_empty() && edge_refs.is_empty() {
            return Err(CoreError::Validation(ValidationError::Other(
                "add_note requires at least one node_id or edge_ref".into(),
            )));
        }

        let note = Note {
            id: format!("note_{}", uuid::Uuid::new_v4()),
            title,
            body,
            created_at: chrono::Utc::now(),
            node_ids,
            edge_refs,
        };
        let id = note.id.clone();
        self.store.add_note(note).await?;
        Ok(json!({"id": id}))
    }

    async fn tool_get_note(&self, args: Json) -> Result<Json, CoreError> {
        let id = str_arg(&args, "id")?;
        match self.store.get_note(&id).await? {
            Some(note) => Ok(serde_json::to_value(note).expect("Note always serializes")),
            None => Err(CoreError::Storage(StorageError::NotFound(format!("note {id}")))),
        }
    }

    async fn tool_delete_note(&self, args: Json) -> Result<Json, CoreError> {
        let id = str_arg(&args, "id")?;
        if self.store.get_note(&id).await?.is_none() {
            return Err(CoreError::Storage(StorageError::NotFound(format!("note {id}"))));
        }
        self.store.delete_note(&id).await?;
        Ok(json!({"deleted": id}))
    }

    async fn tool_get_topology(&self, args: Json) -> Result<Json, CoreError> {
        let root_id = str_arg(&args, "root_id")?;
        let depth = args
            .get("depth")
            .and_then(Json::as_u64)
            .ok_or(CoreError::Validation(ValidationError::MissingArgument("depth")))? as u32;
        let topology = self.store.topology(&root_id, depth).await?;
        Ok(serde_json::to_value(topology).expect("Topology always serializes"))
    }

    async fn tool_proxy(&self, tool: ProxyTool, args: Json) -> Result<Json, CoreError> {
        let window_args = TimeWindowArgs {
            start_time_iso: args.get("start_time_iso").and_then(Json::as_str).map(String::from),
            end_time_iso: args.get("end_time_iso").and_then(Json::as_str).map(String::from),
            lookback_minutes: args.get("lookback_minutes").and_then(Json::as_i64),
        };
        let window = resolve_time_window(&window_args)?;

        let extra: Vec<(&str, String)> = match args.as_object() {
            Some(map) => map
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "start_time_iso" | "end_time_iso" | "lookback_minutes"))
                .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s.to_string())))
                .collect(),
            None => Vec::new(),
        };

        self.backend.fetch(tool, window, &extra).await
    }
}

fn str_arg(args: &Json, field: &'static str) -> Result<String, CoreError> {
    args.get(field)
        .and_then(Json::as_str)
        .map(String::from)
        .ok_or(CoreError::Validation(ValidationError::MissingArgument(field)))
}

fn parse_array<T: DeserializeOwned>(args: &Json, field: &str) -> Result<Vec<T>, CoreError> {
    match args.get(field) {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| CoreError::Validation(ValidationError::Other(format!("invalid {field}: {e}")))),
    }
}

fn initialize_result() -> Json {
    json!({
        "protocolVersion": "2024-11-05",
        "serverInfo": {"name": "kg-server", "version": env!("CARGO_PKG_VERSION")},
        "capabilities": {"tools": {}, "prompts": {}}
    })
}

fn tools_list_result() -> Json {
    let defs: Vec<Json> = tools::all_tool_definitions()
        .into_iter()
        .map(|(name, description, schema)| json!({"name": name, "description": description, "inputSchema": schema}))
        .collect();
    json!({"tools": defs})
}

fn handle_prompts_get(id: Json, params: &Json) -> JsonRpcResponse {
    let name = match params.get("name").and_then(Json::as_str) {
        Some(n) => n,
        None => return JsonRpcResponse::failure(id, JsonRpcError::new(INVALID_PARAMS, "missing prompt name")),
    };
    match prompts::get(name) {
        Some(result) => JsonRpcResponse::success(id, result),
        None => JsonRpcResponse::failure(id, JsonRpcError::new(INVALID_PARAMS, format!("unknown prompt: {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_auth::{TokenManager, TokenManagerConfig};
    use kg_backend::BackendClientConfig;
    use kg_store_memory::MemoryGraphStore;
    use std::time::Duration;

    fn fresh_jwt() -> String {
        use base64::Engine;
        let exp = (chrono::Utc::now() + chrono::Duration::hours(2)).timestamp();
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}"));
        format!("{header}.{payload}.sig")
    }

    fn test_server() -> McpServer {
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let pipeline = Arc::new(Pipeline::new());
        let tokens = TokenManager::new(TokenManagerConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            auth_token: fresh_jwt(),
            refresh_token: None,
            http_timeout: Duration::from_secs(5),
        })
        .unwrap();
        let backend = Arc::new(
            BackendClient::new(
                BackendClientConfig { base_url: "http://127.0.0.1:1".to_string(), timeout: Duration::from_secs(5) },
                tokens,
            )
            .unwrap(),
        );
        McpServer::new(store, pipeline, backend)
    }

    fn call(id: i64, method: &str, params: Json) -> JsonRpcRequest {
        JsonRpcRequest { jsonrpc: "2.0".to_string(), id: Some(json!(id)), method: method.to_string(), params }
    }

    #[tokio::test]
    async fn tools_list_includes_every_named_tool() {
        let server = test_server();
        let resp = server.handle(call(1, "tools/list", json!({}))).await.unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, tools::all_tool_definitions().len());
    }

    #[tokio::test]
    async fn notifications_initialized_gets_no_response() {
        let server = test_server();
        let req = JsonRpcRequest { jsonrpc: "2.0".to_string(), id: None, method: "notifications/initialized".to_string(), params: Json::Null };
        assert!(server.handle(req).await.is_none());
    }

    #[tokio::test]
    async fn ingest_then_search_round_trip_through_tools() {
        let server = test_server();
        let ingest_args = json!({
            "arguments": {
                "nodes": [{"id": "service:checkout", "type": "Service", "name": "checkout"}]
            }
        });
        let resp = server.handle(call(1, "tools/call", ingest_args)).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], json!(false));

        let search_args = json!({"name": "search", "arguments": {"query": "checkout"}});
        let resp = server.handle(call(2, "tools/call", search_args)).await.unwrap();
        let text = resp.result.unwrap()["content"][0]["text"].as_str().unwrap().to_string();
        let search_result: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(search_result["nodes"][0]["id"], json!("service:checkout"));
    }

    #[tokio::test]
    async fn add_note_without_a_link_is_an_error_result() {
        let server = test_server();
        let args = json!({"name": "add_note", "arguments": {"title": "t", "body": "b"}});
        let resp = server.handle(call(1, "tools/call", args)).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("at least one"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result_not_a_protocol_error() {
        let server = test_server();
        let args = json!({"name": "not_a_real_tool", "arguments": {}});
        let resp = server.handle(call(1, "tools/call", args)).await.unwrap();
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["isError"], json!(true));
    }

    #[tokio::test]
    async fn get_note_missing_is_not_found() {
        let server = test_server();
        let args = json!({"name": "get_note", "arguments": {"id": "missing"}});
        let resp = server.handle(call(1, "tools/call", args)).await.unwrap();
        assert_eq!(resp.result.unwrap()["isError"], json!(true));
    }

    #[tokio::test]
    async fn proxy_tool_rejects_bad_time_range() {
        let server = test_server();
        let args = json!({
            "name": "get_metrics",
            "arguments": {"start_time_iso": "2026-01-01 10:00:00", "end_time_iso": "2026-01-01 09:00:00"}
        });
        let resp = server.handle(call(1, "tools/call", args)).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("start_time cannot be after end_time"));
    }
}
