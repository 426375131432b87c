//! Streamable-HTTP transport (spec §6): a single POST endpoint, an
//! optional session header for correlating a client's requests, selected
//! at start-up instead of stdio via the `--http` flag / `HTTP` env var.

use crate::handler::McpServer;
use crate::protocol::JsonRpcRequest;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
}

/// Builds the HTTP router with the configured request limit applied (spec
/// §6's "request rate and burst" config surface). `tower`'s window-based
/// `RateLimitLayer` holds a `tokio::time::Sleep` in its service state, which
/// isn't `Clone` and so can't back an axum router (axum requires the whole
/// composed service to be `Clone`); `ConcurrencyLimitLayer` is `Clone`-safe
/// and is the limiter this router uses instead, with `request_rate` and
/// `request_burst` combined into one in-flight-request ceiling rather than
/// modeled as two independent knobs. The stdio transport has no equivalent
/// layer: it serves a single local process over its own stdin/stdout pipe,
/// not a pool of network clients, so there is nothing to throttle.
pub fn router(server: Arc<McpServer>, request_rate: u32, request_burst: u32) -> Router {
    let concurrency = request_rate.saturating_add(request_burst).max(1) as usize;
    Router::new()
        .route("/", post(handle_rpc))
        .layer(ConcurrencyLimitLayer::new(concurrency))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { server })
}

async fn handle_rpc(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<JsonRpcRequest>) -> impl IntoResponse {
    if let Some(session) = headers.get(SESSION_HEADER) {
        debug!(session = ?session, "mcp http request");
    }
    match state.server.handle(req).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        // A notification gets no JSON-RPC response; 202 tells the client
        // the frame was accepted with nothing further to send.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

pub async fn serve(server: Arc<McpServer>, addr: SocketAddr, request_rate: u32, request_burst: u32) -> std::io::Result<()> {
    let app = router(server, request_rate, request_burst);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http transport listening");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use kg_auth::{TokenManager, TokenManagerConfig};
    use kg_backend::{BackendClient, BackendClientConfig};
    use kg_core::traits::GraphStore;
    use kg_extract::Pipeline;
    use kg_store_memory::MemoryGraphStore;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn fresh_jwt() -> String {
        use base64::Engine;
        let exp = (chrono::Utc::now() + chrono::Duration::hours(2)).timestamp();
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}"));
        format!("{header}.{payload}.sig")
    }

    fn test_server() -> Arc<McpServer> {
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
        Arc::new(McpServer::new(store, pipeline, backend))
    }

    #[tokio::test]
    async fn ping_over_http_returns_empty_result() {
        let app = router(test_server(), 10, 20);
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": {}}).to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn notification_over_http_is_accepted_with_no_body() {
        let app = router(test_server(), 10, 20);
        let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized", "params": {}}).to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
