//! Client-facing serve loop: line-framed JSON-RPC on stdin/stdout.
//!
//! One request per line in, one response per line out. A malformed or
//! unsupported request produces a JSON-RPC error response; nothing makes the
//! loop die short of stdin closing.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use veil_proxy::VeilProxy;
use veil_types::envelope::{ResourceRequest, ToolRequest};
use veil_types::errors::VeilError;
use veil_types::rpc::{self, JsonRpcMessage};

/// Serve MCP requests from stdin until it closes.
pub async fn serve_stdio(proxy: VeilProxy) -> Result<(), VeilError> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| VeilError::Upstream(format!("failed to read client request: {e}")))?
    {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message: JsonRpcMessage = match serde_json::from_str(trimmed) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "unparseable client request");
                write_reply(
                    &mut stdout,
                    &JsonRpcMessage::error(Value::Null, rpc::PARSE_ERROR, "parse error"),
                )
                .await?;
                continue;
            }
        };

        let Some(reply) = dispatch(&proxy, message).await else {
            continue;
        };
        write_reply(&mut stdout, &reply).await?;
    }

    debug!("client closed stdin, shutting down");
    Ok(())
}

async fn write_reply(
    stdout: &mut tokio::io::Stdout,
    reply: &JsonRpcMessage,
) -> Result<(), VeilError> {
    let mut line = serde_json::to_string(reply)?;
    line.push('\n');
    stdout
        .write_all(line.as_bytes())
        .await
        .map_err(|e| VeilError::Upstream(format!("failed to write client response: {e}")))?;
    stdout
        .flush()
        .await
        .map_err(|e| VeilError::Upstream(format!("failed to flush client response: {e}")))
}

/// Route one client message. Notifications get no reply.
async fn dispatch(proxy: &VeilProxy, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
    let method = message.method.clone().unwrap_or_default();
    let Some(id) = message.id else {
        debug!(method = %method, "ignoring client notification");
        return None;
    };

    let reply = match method.as_str() {
        "initialize" => JsonRpcMessage::result(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}, "resources": {}},
                "serverInfo": {
                    "name": "veil",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        ),
        "ping" => JsonRpcMessage::result(id, json!({})),
        "tools/list" => match proxy.list_tools().await {
            Ok(tools) => JsonRpcMessage::result(id, tools),
            Err(err) => error_reply(id, &err),
        },
        "tools/call" => {
            let params = message.params.unwrap_or_else(|| json!({}));
            let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
                return Some(JsonRpcMessage::error(
                    id,
                    rpc::INVALID_PARAMS,
                    "tools/call requires a tool name",
                ));
            };
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let request = ToolRequest::new(tool_name, arguments);
            match proxy.call_tool(request).await {
                Ok(response) => match serde_json::to_value(&response) {
                    Ok(result) => JsonRpcMessage::result(id, result),
                    Err(err) => JsonRpcMessage::error(id, rpc::INTERNAL_ERROR, err.to_string()),
                },
                Err(err) => error_reply(id, &err),
            }
        }
        "resources/read" => {
            let params = message.params.unwrap_or_else(|| json!({}));
            let Some(uri) = params.get("uri").and_then(Value::as_str) else {
                return Some(JsonRpcMessage::error(
                    id,
                    rpc::INVALID_PARAMS,
                    "resources/read requires a uri",
                ));
            };
            let request = ResourceRequest {
                uri: uri.to_string(),
            };
            match proxy.read_resource(request).await {
                Ok(response) => match serde_json::to_value(&response) {
                    Ok(result) => JsonRpcMessage::result(id, result),
                    Err(err) => JsonRpcMessage::error(id, rpc::INTERNAL_ERROR, err.to_string()),
                },
                Err(err) => error_reply(id, &err),
            }
        }
        other => JsonRpcMessage::error(
            id,
            rpc::METHOD_NOT_FOUND,
            format!("method '{other}' is not supported"),
        ),
    };

    Some(reply)
}

fn error_reply(id: Value, err: &VeilError) -> JsonRpcMessage {
    JsonRpcMessage::error(id, rpc::INTERNAL_ERROR, err.to_string())
}
