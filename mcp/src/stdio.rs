//! Line-delimited JSON-RPC over standard input/output (spec §6 default
//! transport). One request per line in, one response per line out; parse
//! failures reply with a JSON-RPC parse-error rather than killing the loop.
//!
//! Exempt from the `request_rate`/`request_burst` config surface (spec §6):
//! this transport serves one local process over its own stdin/stdout pipe,
//! not a pool of network clients, so there's nothing to admission-control.

use crate::handler::McpServer;
use crate::protocol::{JsonRpcError, JsonRpcResponse, PARSE_ERROR};
use serde_json::Value as Json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error};

/// Runs until stdin closes. Each line is parsed independently; a line that
/// fails to parse gets a parse-error response (with a null id, since the
/// id couldn't be recovered) rather than terminating the session.
pub async fn serve(server: Arc<McpServer>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str(&line) {
            Ok(req) => server.handle(req).await,
            Err(e) => {
                error!(error = %e, "failed to parse JSON-RPC request line");
                Some(JsonRpcResponse::failure(Json::Null, JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}"))))
            }
        };

        if let Some(response) = response {
            let mut payload = serde_json::to_vec(&response).expect("JsonRpcResponse always serializes");
            payload.push(b'\n');
            stdout.write_all(&payload).await?;
            stdout.flush().await?;
        } else {
            debug!("no response required for notification");
        }
    }

    Ok(())
}
