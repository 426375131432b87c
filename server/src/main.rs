mod cli;
mod config;

use clap::Parser;
use cli::Cli;
use config::ServerConfig;
use kg_auth::{TokenManager, TokenManagerConfig};
use kg_backend::{BackendClient, BackendClientConfig};
use kg_core::traits::GraphStore;
use kg_extract::Pipeline;
use kg_mcp::McpServer;
use kg_store::SqliteStore;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();

    let mut config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(1);
        }
    };
    if args.http {
        config.http = true;
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "fatal error");
        process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = ServerConfig::db_path()?;
    info!(path = %db_path.display(), "opening knowledge graph store");
    let store: Arc<dyn GraphStore> = Arc::new(SqliteStore::open(&db_path)?);

    for schema in kg_schema::prelude::builtin_schemas() {
        store.register_builtin_schema(schema).await?;
    }

    let tokens = TokenManager::new(TokenManagerConfig {
        base_url: config.base_url.clone(),
        auth_token: config.auth_token.clone(),
        refresh_token: config.refresh_token.clone(),
        http_timeout: Duration::from_secs(30),
    })?;
    tokio::spawn(Arc::clone(&tokens).background_refresh_loop());

    let backend = Arc::new(BackendClient::new(
        BackendClientConfig { base_url: config.base_url.clone(), timeout: Duration::from_secs(30) },
        tokens,
    )?);

    let pipeline = Arc::new(Pipeline::new());
    let server = Arc::new(McpServer::new(store, pipeline, backend));

    if config.http {
        let addr = config.socket_addr()?;
        kg_mcp::http::serve(server, addr, config.request_rate, config.request_burst).await?;
    } else {
        info!("serving over stdio");
        kg_mcp::stdio::serve(server).await?;
    }

    Ok(())
}
