//! HTTP client for the observability backend. Every backend-proxy tool
//! (logs, traces, metrics, APM summaries, alerts, change events) funnels
//! through `BackendClient::fetch`: acquire a token, call, retry exactly
//! once on 401/403 after a forced refresh (spec §4.9, §8.2).

use crate::time_window::TimeWindow;
use kg_auth::TokenManager;
use kg_core::errors::{BackendError, CoreError};
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The six backend-proxy tool kinds named in spec §4: purely mechanical
/// path templating, no engineering depth of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyTool {
    Logs,
    Traces,
    Metrics,
    ApmSummary,
    Alerts,
    ChangeEvents,
}

impl ProxyTool {
    fn path(self) -> &'static str {
        match self {
            ProxyTool::Logs => "/api/v1/logs",
            ProxyTool::Traces => "/api/v1/traces",
            ProxyTool::Metrics => "/api/v1/metrics",
            ProxyTool::ApmSummary => "/api/v1/apm/summary",
            ProxyTool::Alerts => "/api/v1/alerts",
            ProxyTool::ChangeEvents => "/api/v1/change-events",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for BackendClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

impl BackendClient {
    pub fn new(config: BackendClientConfig, tokens: Arc<TokenManager>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url,
            tokens,
        })
    }

    /// Fetches one proxy tool's JSON body for the given resolved time
    /// window, adding any extra query parameters the caller supplies
    /// (e.g. a log query string, a trace id).
    pub async fn fetch(
        &self,
        tool: ProxyTool,
        window: TimeWindow,
        extra_query: &[(&str, String)],
    ) -> Result<Json, CoreError> {
        let mut query: Vec<(&str, String)> = vec![
            ("start_time", window.start_iso()),
            ("end_time", window.end_iso()),
        ];
        query.extend(extra_query.iter().cloned());

        let token = self.tokens.acquire().await?;
        let response = self.send(tool, &query, &token).await?;

        if matches!(response.status().as_u16(), 401 | 403) {
            debug!(status = %response.status(), tool = ?tool, "backend rejected token, forcing refresh and retrying once");
            let token = self.tokens.force_refresh().await?;
            let response = self.send(tool, &query, &token).await?;
            return Self::into_json(response).await;
        }

        Self::into_json(response).await
    }

    async fn send(
        &self,
        tool: ProxyTool,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), tool.path());
        self.http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))
    }

    async fn into_json(response: reqwest::Response) -> Result<Json, CoreError> {
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            // Second attempt still unauthorized: not transient, surface as-is.
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::NonSuccess { status: status.as_u16(), body }.into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "backend returned non-success");
            return Err(BackendError::NonSuccess { status: status.as_u16(), body }.into());
        }
        response
            .json::<Json>()
            .await
            .map_err(|e| BackendError::Request(format!("malformed response body: {e}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_window::{resolve_time_window, TimeWindowArgs};
    use kg_auth::{TokenManager, TokenManagerConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fresh_jwt() -> String {
        use base64::Engine;
        let exp = (chrono::Utc::now() + chrono::Duration::hours(2)).timestamp();
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}"));
        format!("{header}.{payload}.sig")
    }

    async fn token_manager(server: &MockServer) -> Arc<TokenManager> {
        TokenManager::new(TokenManagerConfig {
            base_url: server.uri(),
            auth_token: fresh_jwt(),
            refresh_token: Some("rt".into()),
            http_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_backend_json_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"series": []})))
            .mount(&server)
            .await;

        let tokens = token_manager(&server).await;
        let client = BackendClient::new(
            BackendClientConfig {
                base_url: server.uri(),
                timeout: Duration::from_secs(5),
            },
            tokens,
        )
        .unwrap();

        let window = resolve_time_window(&TimeWindowArgs::default()).unwrap();
        let body = client.fetch(ProxyTool::Metrics, window, &[]).await.unwrap();
        assert_eq!(body["series"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn retries_once_after_401_then_succeeds() {
        let server = MockServer::start().await;
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let counter = refresh_calls.clone();
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(move |_: &wiremock::Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": fresh_jwt()}))
            })
            .mount(&server)
            .await;

        let call_count = Arc::new(AtomicUsize::new(0));
        let metrics_counter = call_count.clone();
        Mock::given(method("GET"))
            .and(path("/api/v1/logs"))
            .respond_with(move |_: &wiremock::Request| {
                let n = metrics_counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    ResponseTemplate::new(401)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({"lines": []}))
                }
            })
            .mount(&server)
            .await;

        let tokens = token_manager(&server).await;
        let client = BackendClient::new(
            BackendClientConfig {
                base_url: server.uri(),
                timeout: Duration::from_secs(5),
            },
            tokens,
        )
        .unwrap();

        let window = resolve_time_window(&TimeWindowArgs::default()).unwrap();
        let body = client.fetch(ProxyTool::Logs, window, &[]).await.unwrap();
        assert_eq!(body["lines"], serde_json::json!([]));
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_success_other_than_401_403_surfaces_as_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/alerts"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let tokens = token_manager(&server).await;
        let client = BackendClient::new(
            BackendClientConfig {
                base_url: server.uri(),
                timeout: Duration::from_secs(5),
            },
            tokens,
        )
        .unwrap();

        let window = resolve_time_window(&TimeWindowArgs::default()).unwrap();
        match client.fetch(ProxyTool::Alerts, window, &[]).await {
            Err(CoreError::Backend(BackendError::NonSuccess { status, body })) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected BackendError::NonSuccess, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn extra_query_params_reach_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/traces"))
            .and(query_param("trace_id", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"spans": []})))
            .mount(&server)
            .await;

        let tokens = token_manager(&server).await;
        let client = BackendClient::new(
            BackendClientConfig {
                base_url: server.uri(),
                timeout: Duration::from_secs(5),
            },
            tokens,
        )
        .unwrap();

        let window = resolve_time_window(&TimeWindowArgs::default()).unwrap();
        let body = client
            .fetch(ProxyTool::Traces, window, &[("trace_id", "abc123".to_string())])
            .await
            .unwrap();
        assert_eq!(body["spans"], serde_json::json!([]));
    }
}
