//! Process configuration (spec §6): loaded once at start-up from environment
//! variables via `figment`, the same crate the donor's `KgctlConfig::load`
//! uses, minus the file layer — this server has nothing worth putting in a
//! YAML file beyond what an env var already covers.

use figment::providers::Env;
use figment::Figment;
use kg_core::errors::{CoreError, ValidationError};
use serde::Deserialize;

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_http() -> bool {
    false
}

fn default_request_rate() -> u32 {
    10
}

fn default_request_burst() -> u32 {
    20
}

/// Everything the server needs to run, gathered into one struct and handed
/// to every handler by `Arc` (Design Note in spec §9: configuration is an
/// explicit struct, not ambient globals).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub auth_token: String,
    pub base_url: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_http")]
    pub http: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_request_rate")]
    pub request_rate: u32,
    #[serde(default = "default_request_burst")]
    pub request_burst: u32,
}

impl ServerConfig {
    /// Reads `AUTH_TOKEN`, `BASE_URL`, `REFRESH_TOKEN`, `HTTP`, `PORT`,
    /// `HOST`, `REQUEST_RATE`, `REQUEST_BURST` from the environment.
    /// `AUTH_TOKEN` and `BASE_URL` are required; everything else defaults.
    pub fn load() -> Result<Self, CoreError> {
        Figment::new()
            .merge(Env::raw())
            .extract()
            .map_err(|e| CoreError::Validation(ValidationError::Other(format!("configuration error: {e}"))))
    }

    /// Where the knowledge graph lives (spec §6): `$HOME/.last9/knowledge.db`.
    /// The parent directory is created on first launch if missing.
    pub fn db_path() -> Result<std::path::PathBuf, CoreError> {
        let home = std::env::var("HOME").map_err(|_| CoreError::Validation(ValidationError::Other("HOME is not set".to_string())))?;
        let dir = std::path::Path::new(&home).join(".last9");
        std::fs::create_dir_all(&dir)
            .map_err(|e| CoreError::Validation(ValidationError::Other(format!("failed to create {}: {e}", dir.display()))))?;
        Ok(dir.join("knowledge.db"))
    }

    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, CoreError> {
        use std::net::ToSocketAddrs;
        format!("{}:{}", self.host, self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| CoreError::Validation(ValidationError::Other(format!("invalid HOST/PORT: {}:{}", self.host, self.port))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in ["AUTH_TOKEN", "BASE_URL", "REFRESH_TOKEN", "HTTP", "PORT", "HOST", "REQUEST_RATE", "REQUEST_BURST"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_vars_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(ServerConfig::load().is_err());
    }

    #[test]
    fn defaults_fill_in_around_the_required_pair() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("AUTH_TOKEN", "t");
        std::env::set_var("BASE_URL", "http://example.test");
        let cfg = ServerConfig::load().unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, "localhost");
        assert!(!cfg.http);
        clear_env();
    }

    #[test]
    fn explicit_overrides_are_honored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("AUTH_TOKEN", "t");
        std::env::set_var("BASE_URL", "http://example.test");
        std::env::set_var("HTTP", "true");
        std::env::set_var("PORT", "9090");
        let cfg = ServerConfig::load().unwrap();
        assert!(cfg.http);
        assert_eq!(cfg.port, 9090);
        clear_env();
    }

    #[test]
    fn socket_addr_resolves_localhost() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("AUTH_TOKEN", "t");
        std::env::set_var("BASE_URL", "http://example.test");
        let cfg = ServerConfig::load().unwrap();
        assert!(cfg.socket_addr().is_ok());
        clear_env();
    }
}
