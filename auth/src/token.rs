//! The Token Manager (spec §4.1): holds `(access_token, refresh_token,
//! expires_at)`, coalesces concurrent refreshes to at most one in flight,
//! and exposes the retry-on-401/403 entry point used by backend-proxy
//! tool handlers.

use crate::circuit::CircuitBreaker;
use crate::jwt;
use chrono::{DateTime, Duration, Utc};
use kg_core::errors::AuthError;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct TokenState {
    access_token: String,
    expires_at: DateTime<Utc>,
    /// Half the token's original lifetime — the point at which we treat it
    /// as due for refresh, ahead of hard expiry.
    buffer: Duration,
}

impl TokenState {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - self.buffer
    }
}

#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    pub base_url: String,
    pub auth_token: String,
    pub refresh_token: Option<String>,
    pub http_timeout: std::time::Duration,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct TokenManager {
    state: RwLock<TokenState>,
    refresh_gate: Mutex<()>,
    circuit: Mutex<CircuitBreaker>,
    http: reqwest::Client,
    base_url: String,
    refresh_token: RwLock<Option<String>>,
}

impl TokenManager {
    pub fn new(config: TokenManagerConfig) -> Result<Arc<Self>, AuthError> {
        let now = Utc::now();
        let expires_at = jwt::decode_expiry(&config.auth_token).unwrap_or(now + Duration::hours(1));
        let buffer = (expires_at - now) / 2;

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        Ok(Arc::new(Self {
            state: RwLock::new(TokenState {
                access_token: config.auth_token,
                expires_at,
                buffer,
            }),
            refresh_gate: Mutex::new(()),
            circuit: Mutex::new(CircuitBreaker::new()),
            http,
            base_url: config.base_url,
            refresh_token: RwLock::new(config.refresh_token),
        }))
    }

    /// Returns a token known valid for at least `buffer` beyond now,
    /// refreshing first if necessary. At most one refresh runs at a time;
    /// concurrent callers that arrive while a refresh is in flight wait on
    /// `refresh_gate` rather than triggering their own call.
    pub async fn acquire(&self) -> Result<String, AuthError> {
        {
            let state = self.state.read().await;
            if state.is_fresh(Utc::now()) {
                return Ok(state.access_token.clone());
            }
        }
        self.refresh().await
    }

    /// Forces a refresh regardless of the cached token's apparent freshness
    /// — the entry point for the retry-on-401/403 path (spec §4.1, §4.9).
    pub async fn force_refresh(&self) -> Result<String, AuthError> {
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        if let Some(remaining) = self.circuit.lock().await.open_remaining_secs(Utc::now()) {
            return Err(AuthError::CircuitOpen {
                retry_after_secs: remaining,
            });
        }

        let _permit = self.refresh_gate.lock().await;

        // Another caller may have refreshed while we waited for the gate.
        {
            let state = self.state.read().await;
            if state.is_fresh(Utc::now()) {
                return Ok(state.access_token.clone());
            }
        }

        let refresh_token = self
            .refresh_token
            .read()
            .await
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;

        debug!("refreshing access token");
        let issued_at = Utc::now();
        let result = self
            .http
            .post(format!("{}/auth/refresh", self.base_url.trim_end_matches('/')))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        match result {
            Ok(resp) => match resp.json::<RefreshResponse>().await {
                Ok(body) => {
                    let expires_at = jwt::decode_expiry(&body.access_token).unwrap_or(issued_at + Duration::hours(1));
                    let buffer = (expires_at - issued_at) / 2;
                    {
                        let mut state = self.state.write().await;
                        state.access_token = body.access_token.clone();
                        state.expires_at = expires_at;
                        state.buffer = buffer;
                    }
                    if let Some(new_refresh_token) = body.refresh_token {
                        *self.refresh_token.write().await = Some(new_refresh_token);
                    }
                    self.circuit.lock().await.record_success();
                    info!("access token refreshed");
                    Ok(body.access_token)
                }
                Err(e) => {
                    self.circuit.lock().await.record_failure(Utc::now());
                    Err(AuthError::RefreshFailed(format!("bad refresh response body: {e}")))
                }
            },
            Err(e) => {
                self.circuit.lock().await.record_failure(Utc::now());
                Err(AuthError::RefreshFailed(e.to_string()))
            }
        }
    }

    /// Runs forever, waking shortly after the cached token crosses its
    /// refresh buffer and proactively refreshing it. Spawn with
    /// `tokio::spawn(manager.clone().background_refresh_loop())`.
    pub async fn background_refresh_loop(self: Arc<Self>) {
        loop {
            let sleep_for = {
                let state = self.state.read().await;
                let due_at = state.expires_at - state.buffer;
                let now = Utc::now();
                if due_at > now {
                    (due_at - now).to_std().unwrap_or(std::time::Duration::from_secs(30))
                } else {
                    std::time::Duration::from_secs(0)
                }
            };
            tokio::time::sleep(sleep_for.max(std::time::Duration::from_secs(1))).await;
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "background token refresh failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn expired_jwt() -> String {
        use base64::Engine;
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"exp\":1}");
        format!("{header}.{payload}.sig")
    }

    fn fresh_jwt() -> String {
        use base64::Engine;
        let exp = (Utc::now() + Duration::hours(2)).timestamp();
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}"));
        format!("{header}.{payload}.sig")
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_into_one_refresh_call() {
        let server = MockServer::start().await;
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(move |_: &wiremock::Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": fresh_jwt(),
                }))
            })
            .mount(&server)
            .await;

        let manager = TokenManager::new(TokenManagerConfig {
            base_url: server.uri(),
            auth_token: expired_jwt(),
            refresh_token: Some("rt".into()),
            http_timeout: std::time::Duration::from_secs(5),
        })
        .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move { m.acquire().await }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let manager = TokenManager::new(TokenManagerConfig {
            base_url: server.uri(),
            auth_token: expired_jwt(),
            refresh_token: Some("rt".into()),
            http_timeout: std::time::Duration::from_secs(5),
        })
        .unwrap();

        for _ in 0..3 {
            assert!(manager.acquire().await.is_err());
        }
        match manager.acquire().await {
            Err(AuthError::CircuitOpen { .. }) => {}
            other => panic!("expected circuit open, got {other:?}"),
        }
    }
}
