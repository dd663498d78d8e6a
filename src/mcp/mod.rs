//! MCP (Model Context Protocol) server exposing note tools over stdio
//!
//! Reads JSON-RPC requests line-by-line from stdin and writes responses to
//! stdout, which is why all logging in this process goes to stderr.

mod contract;
mod server;
mod types;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::service::NoteService;

pub use contract::NOTE_FORMAT_CONTRACT;
pub use server::{McpServer, MCP_PROTOCOL_VERSION};
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Serve MCP over stdin/stdout until EOF.
pub async fn serve_stdio(service: Arc<NoteService>) -> Result<()> {
    let server = McpServer::new(service);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response = JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id: None,
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32700,
                        message: format!("Parse error: {}", e),
                    }),
                };
                write_response(&mut stdout, &response).await?;
                continue;
            }
        };

        let response = server.handle_request(request).await;

        // Notifications get no response.
        if response.id.is_none()
            && response
                .result
                .as_ref()
                .map(|v| v.is_null())
                .unwrap_or(false)
        {
            continue;
        }

        write_response(&mut stdout, &response).await?;
    }

    Ok(())
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    response: &JsonRpcResponse,
) -> Result<()> {
    let mut encoded = serde_json::to_vec(response)?;
    encoded.push(b'\n');
    stdout.write_all(&encoded).await?;
    stdout.flush().await?;
    Ok(())
}
