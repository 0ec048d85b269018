use triage_core::format::{format_dispatch, format_outcome, format_threads};
use triage_core::{reply_subject, Format, TriageService};
use triage_domain::{DraftRequest, ThreadRecord};
use triage_error::{ErrorResponse, TriageError};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use super::tools;
use super::types::*;

pub struct McpServer {
    service: TriageService,
    query: String,
}

impl McpServer {
    pub fn new(service: TriageService, query: String) -> Self {
        Self { service, query }
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();

        debug!("MCP server started, waiting for requests on stdin");

        while let Some(line) = lines.next_line().await? {
            if let Some(resp) = self.handle_line(&line).await {
                write_response(&mut stdout, &resp).await?;
            }
        }

        debug!("stdin closed, MCP server shutting down");
        Ok(())
    }

    /// One JSON-RPC line in, at most one response out. Notifications get none.
    pub async fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let msg: RpcMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                return Some(RpcResponse::err(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ))
            }
        };

        let Some(id) = msg.id.clone() else {
            if msg.method.as_deref() == Some("notifications/initialized") {
                debug!("client initialized");
            }
            return None;
        };

        if !msg.is_valid_jsonrpc() {
            return Some(RpcResponse::err(
                id,
                INVALID_REQUEST,
                "invalid jsonrpc version (expected \"2.0\")",
            ));
        }

        let resp = match msg.method.as_deref().unwrap_or("") {
            "" => RpcResponse::err(id, INVALID_REQUEST, "missing method"),
            "initialize" => self.handle_initialize(id),
            "tools/list" => RpcResponse::ok(id, json!({ "tools": tools::available_tools() })),
            "tools/call" => self.handle_tools_call(id, msg.params).await,
            "ping" => RpcResponse::ok(id, json!({})),
            method => RpcResponse::err(id, METHOD_NOT_FOUND, format!("unknown method: {method}")),
        };
        Some(resp)
    }

    fn handle_initialize(&self, id: Value) -> RpcResponse {
        debug!(
            replies = self.service.replies().is_available(),
            "initialized"
        );

        RpcResponse::ok(
            id,
            json!({
                "protocolVersion": "2025-11-25",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "triage",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> RpcResponse {
        let params: CallToolParams = match params.and_then(|v| serde_json::from_value(v).ok()) {
            Some(p) => p,
            None => return RpcResponse::err(id, INVALID_PARAMS, "missing or invalid params"),
        };

        let args = params.arguments.unwrap_or(json!({}));
        let tool_result = ToolResult::from(self.dispatch_tool(&params.name, &args).await);

        match serde_json::to_value(tool_result) {
            Ok(val) => RpcResponse::ok(id, val),
            Err(e) => RpcResponse::err(id, INTERNAL_ERROR, format!("serialization error: {e}")),
        }
    }

    async fn dispatch_tool(&self, name: &str, args: &Value) -> Result<String, String> {
        let fmt = Format::parse(args.get("format").and_then(|v| v.as_str()));

        match name {
            "fetch_unread" => {
                let query = args
                    .get("query")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&self.query);
                let records = self.service.fetch_unread(query).await.map_err(fmt_err)?;
                Ok(format_threads(&records, fmt))
            }
            "generate_reply" => {
                let record: ThreadRecord = parse_args(args)?;
                self.service.generate_reply(&record).await.map_err(fmt_err)
            }
            "create_drafts" => {
                let responses = args
                    .get("responses")
                    .cloned()
                    .ok_or("missing 'responses' parameter")?;
                let entries: Vec<Value> = parse_args(&responses)?;
                let requests: Vec<DraftRequest> = entries.into_iter().map(draft_request).collect();
                let outcome = self
                    .service
                    .create_drafts(&requests)
                    .await
                    .map_err(fmt_err)?;
                Ok(format_outcome(&outcome, fmt))
            }
            "send_reply" => {
                let thread_id = get_str(args, "thread_id")?;
                let reply = get_str(args, "reply")?;
                let to = get_str(args, "to")?;
                let subject = get_str(args, "subject")?;
                let message_id = self
                    .service
                    .send_reply(thread_id, reply, to, &reply_subject(subject))
                    .await
                    .map_err(fmt_err)?;
                Ok(format!(
                    "Reply sent and thread marked as read for thread ID: {thread_id} (message ID: {message_id})"
                ))
            }
            "send_draft" => {
                let draft_id = get_str(args, "draft_id")?;
                self.service.send_draft(draft_id).await.map_err(fmt_err)?;
                Ok(format!("Draft sent with ID: {draft_id}"))
            }
            "send_thread_draft" => {
                let thread_id = get_str(args, "thread_id")?;
                let dispatch = self
                    .service
                    .send_thread_draft(thread_id)
                    .await
                    .map_err(fmt_err)?;
                Ok(format_dispatch(&dispatch, fmt))
            }

            unknown => {
                warn!(tool = unknown, "unknown tool called");
                Err(format!("unknown tool: {unknown}"))
            }
        }
    }
}

fn fmt_err(e: TriageError) -> String {
    ErrorResponse::from(&e).to_compact()
}

fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, String> {
    serde_json::from_value(args.clone())
        .map_err(|e| fmt_err(TriageError::invalid_input(format!("invalid arguments: {e}"))))
}

/// A malformed entry becomes a request with no thread id, so the batch
/// records it as one failed item instead of rejecting the whole call.
fn draft_request(entry: Value) -> DraftRequest {
    serde_json::from_value(entry).unwrap_or_else(|e| {
        warn!(%e, "malformed draft entry");
        DraftRequest::new("", "")
    })
}

fn get_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or(format!("missing '{key}' parameter"))
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    resp: &RpcResponse,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string(resp)?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
