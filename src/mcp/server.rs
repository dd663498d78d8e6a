//! MCP server core: JSON-RPC dispatch and tool execution
//!
//! Tool failures are reported as tool results flagged `isError`, not as
//! protocol errors; protocol errors are reserved for malformed requests and
//! unknown methods.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use super::contract::NOTE_FORMAT_CONTRACT;
use super::types::{
    CreateNoteArgs, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListNotesArgs, PathArgs, SearchNotesArgs, ServerCapabilities, ServerInfo, Tool,
    ToolCallParams, ToolsCapability, ToolsListResult,
};
use crate::service::{NoteService, ServiceError};

/// MCP protocol version
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct McpServer {
    service: Arc<NoteService>,
}

impl McpServer {
    pub fn new(service: Arc<NoteService>) -> Self {
        Self { service }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "initialized" | "notifications/initialized" => Ok(Value::Null),
            "tools/list" => handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            _ => Err(anyhow!("Unknown method: {}", request.method)),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: request.id,
                result: Some(value),
                error: None,
            },
            Err(e) => {
                tracing::debug!(error = %e, "Request error");
                JsonRpcResponse {
                    jsonrpc: "2.0".into(),
                    id: request.id,
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32000,
                        message: e.to_string(),
                    }),
                }
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value> {
        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "kenaz".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value> {
        let params: ToolCallParams =
            serde_json::from_value(params.ok_or_else(|| anyhow!("Missing params"))?)?;

        let outcome = match params.name.as_str() {
            "search_notes" => self.search_notes(params.arguments).await,
            "read_note" => self.read_note(params.arguments).await,
            "create_note" => self.create_note(params.arguments).await,
            "list_notes" => self.list_notes(params.arguments).await,
            "get_backlinks" => self.get_backlinks(params.arguments).await,
            "get_note_contract" => Ok(NOTE_FORMAT_CONTRACT.to_string()),
            other => return Err(anyhow!("Unknown tool: {}", other)),
        };

        Ok(match outcome {
            Ok(text) => tool_text(&text, false),
            Err(e) => tool_text(&e.to_string(), true),
        })
    }

    async fn search_notes(&self, args: Value) -> Result<String, ServiceError> {
        let args: SearchNotesArgs = parse_args(args)?;
        let results = self
            .service
            .search(&args.query, args.limit.unwrap_or(20))
            .await?;
        serde_json::to_string_pretty(&results)
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }

    async fn read_note(&self, args: Value) -> Result<String, ServiceError> {
        let args: PathArgs = parse_args(args)?;
        let note = self.service.get_note(&args.path).await?;
        Ok(note.content)
    }

    async fn create_note(&self, args: Value) -> Result<String, ServiceError> {
        let args: CreateNoteArgs = parse_args(args)?;
        if !args.path.ends_with(".md") {
            return Err(ServiceError::Invalid("path must end with .md".into()));
        }
        let note = self
            .service
            .create_note(&args.path, args.content.as_bytes())
            .await?;
        Ok(format!("created: {}", note.path))
    }

    async fn list_notes(&self, args: Value) -> Result<String, ServiceError> {
        let args: ListNotesArgs = if args.is_null() {
            ListNotesArgs::default()
        } else {
            parse_args(args)?
        };
        let metas = self
            .service
            .vault()
            .list(&args.folder)
            .map_err(ServiceError::from)?;
        Ok(metas
            .into_iter()
            .map(|m| m.path)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn get_backlinks(&self, args: Value) -> Result<String, ServiceError> {
        let args: PathArgs = parse_args(args)?;
        let backlinks = self.service.backlinks(&args.path).await?;
        if backlinks.is_empty() {
            return Ok("no backlinks found".into());
        }
        Ok(backlinks.join("\n"))
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ServiceError> {
    serde_json::from_value(args).map_err(|e| ServiceError::Invalid(e.to_string()))
}

/// Wrap text as an MCP tool result.
fn tool_text(text: &str, is_error: bool) -> Value {
    let mut result = json!({
        "content": [{ "type": "text", "text": text }],
    });
    if is_error {
        result["isError"] = json!(true);
    }
    result
}

pub(crate) fn handle_tools_list() -> Result<Value> {
    let string_prop = |desc: &str| json!({ "type": "string", "description": desc });

    let tools = vec![
        Tool {
            name: "search_notes".into(),
            description: "Full-text search through notes content and titles.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": string_prop("Search query string"),
                    "limit": { "type": "integer", "description": "Max results (default 20)" },
                },
                "required": ["query"],
            }),
        },
        Tool {
            name: "read_note".into(),
            description: "Read the full content of a Markdown note.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": string_prop("Relative path to the note (e.g. folder/note.md)"),
                },
                "required": ["path"],
            }),
        },
        Tool {
            name: "create_note".into(),
            description: "Create a new Markdown note at the specified path. Content MUST \
                          follow the canonical note format (YAML frontmatter with title, \
                          optional tags, Markdown body with [[wikilinks]]). Read the \
                          contract first via the get_note_contract tool."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": string_prop("Relative path for the new note (must end with .md)"),
                    "content": string_prop("Markdown content following the note format contract"),
                },
                "required": ["path", "content"],
            }),
        },
        Tool {
            name: "list_notes".into(),
            description: "List all notes or notes in a specific folder.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "folder": string_prop("Optional folder to list (empty for all)"),
                },
            }),
        },
        Tool {
            name: "get_backlinks".into(),
            description: "Find all notes that link to the specified note.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": string_prop("Path of the note to find backlinks for"),
                },
                "required": ["path"],
            }),
        },
        Tool {
            name: "get_note_contract".into(),
            description: "Returns the canonical note format contract. Call this before \
                          creating or updating notes to ensure correct structure."
                .into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ];

    Ok(serde_json::to_value(ToolsListResult { tools })?)
}
