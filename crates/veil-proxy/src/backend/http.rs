//! HTTP backend: remote MCP server over streamable HTTP.
//!
//! - HTTP POST with a JSON-RPC body per request
//! - responses as plain JSON or as a `text/event-stream` body
//! - session tracking via the `Mcp-Session-Id` header

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use veil_types::envelope::{ResourceRequest, ResourceResponse, ToolRequest, ToolResponse};
use veil_types::errors::VeilError;
use veil_types::rpc::JsonRpcMessage;
use veil_types::traits::Backend;

/// Configuration for the HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the remote MCP server (e.g. `https://mcp.example.com`).
    pub base_url: String,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Timeout for the full request/response exchange.
    pub read_timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// A parsed SSE event from a `text/event-stream` body.
#[derive(Debug, Clone, Default)]
struct SseEvent {
    /// The `event:` field (event type).
    event: Option<String>,
    /// The `data:` field, accumulated across multiple `data:` lines.
    data: String,
}

/// Parse a raw SSE body into individual events.
///
/// Events are separated by blank lines. Comment lines (leading `:`) and
/// unknown fields are skipped.
fn parse_sse_events(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    for raw_event in body.split("\n\n") {
        let trimmed = raw_event.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut event = SseEvent::default();
        let mut has_data = false;

        for line in trimmed.lines() {
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.find(':') {
                Some(colon) => {
                    let value = line[colon + 1..].strip_prefix(' ').unwrap_or(&line[colon + 1..]);
                    (&line[..colon], value)
                }
                None => (line, ""),
            };

            match field {
                "event" => event.event = Some(value.to_string()),
                "data" => {
                    if has_data {
                        event.data.push('\n');
                    }
                    event.data.push_str(value);
                    has_data = true;
                }
                _ => {}
            }
        }

        if has_data {
            events.push(event);
        }
    }
    events
}

/// Classify an HTTP error status.
///
/// 4xx responses are permanent (retrying the same request cannot help);
/// 5xx responses are server-side and may succeed later.
fn classify_http_status(status: reqwest::StatusCode) -> VeilError {
    if status.is_client_error() {
        VeilError::Upstream(format!(
            "permanent HTTP error {status}: upstream rejected the request"
        ))
    } else if status.is_server_error() {
        VeilError::Upstream(format!(
            "retryable HTTP error {status}: upstream failed to handle the request"
        ))
    } else {
        VeilError::Upstream(format!("unexpected HTTP status {status}"))
    }
}

/// Backend that POSTs JSON-RPC to a remote MCP server.
pub struct HttpBackend {
    config: HttpBackendConfig,
    client: reqwest::Client,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl HttpBackend {
    /// Build the HTTP client. No request is sent yet.
    pub fn new(config: HttpBackendConfig) -> Result<Self, VeilError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| VeilError::Upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(0),
        })
    }

    /// Build the client and run the MCP initialize handshake.
    pub async fn connect(config: HttpBackendConfig) -> Result<Self, VeilError> {
        let backend = Self::new(config)?;
        backend
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "veil-proxy",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        info!(url = %backend.config.base_url, "upstream MCP server initialized");
        Ok(backend)
    }

    fn endpoint_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/mcp")
    }

    /// POST one JSON-RPC request and extract the matching response message
    /// from a JSON or SSE body.
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, VeilError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = JsonRpcMessage::request(json!(id), method, Some(params));

        let mut builder = self
            .client
            .post(self.endpoint_url())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(
                reqwest::header::ACCEPT,
                "text/event-stream, application/json",
            );
        let session = self
            .session_id
            .lock()
            .map_err(|_| VeilError::Upstream("session state poisoned".to_string()))?
            .clone();
        if let Some(session) = session {
            builder = builder.header("Mcp-Session-Id", session);
        }

        let response = builder
            .json(&message)
            .send()
            .await
            .map_err(|e| VeilError::Upstream(format!("HTTP request to upstream failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_http_status(status));
        }

        // Capture the session id the server assigned, if any.
        if let Some(session) = response
            .headers()
            .get("mcp-session-id")
            .and_then(|value| value.to_str().ok())
        {
            debug!(session_id = %session, "captured MCP session id");
            *self
                .session_id
                .lock()
                .map_err(|_| VeilError::Upstream("session state poisoned".to_string()))? =
                Some(session.to_string());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| VeilError::Upstream(format!("failed to read upstream response: {e}")))?;

        let messages: Vec<JsonRpcMessage> = if content_type.starts_with("text/event-stream") {
            parse_sse_events(&body)
                .into_iter()
                // The default SSE event type is "message".
                .filter(|event| event.event.as_deref().map_or(true, |e| e == "message"))
                .filter_map(|event| match serde_json::from_str(&event.data) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!(error = %e, "skipping unparseable SSE event from upstream");
                        None
                    }
                })
                .collect()
        } else {
            vec![serde_json::from_str(&body).map_err(|e| {
                VeilError::Upstream(format!("unparseable JSON-RPC response from upstream: {e}"))
            })?]
        };

        let reply = messages
            .into_iter()
            .find(|candidate| candidate.id.as_ref() == Some(&json!(id)))
            .ok_or_else(|| {
                VeilError::Upstream(format!("no response for {method} in upstream body"))
            })?;

        if let Some(error) = reply.error {
            return Err(VeilError::Upstream(format!(
                "upstream returned error for {method}: {} (code {})",
                error.message, error.code
            )));
        }

        Ok(reply.result.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn call_tool(&self, request: ToolRequest) -> Result<ToolResponse, VeilError> {
        let result = self
            .request(
                "tools/call",
                json!({
                    "name": request.tool_name,
                    "arguments": request.arguments,
                }),
            )
            .await?;
        super::parse_result("tools/call", result)
    }

    async fn read_resource(
        &self,
        request: ResourceRequest,
    ) -> Result<ResourceResponse, VeilError> {
        let result = self
            .request("resources/read", json!({ "uri": request.uri }))
            .await?;
        super::parse_result("resources/read", result)
    }

    async fn list_tools(&self) -> Result<serde_json::Value, VeilError> {
        self.request("tools/list", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── SSE parsing ───────────────────────────────────────────

    #[test]
    fn test_parse_single_sse_event() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\"}\n\n";
        let events = parse_sse_events(body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "{\"jsonrpc\":\"2.0\"}");
    }

    #[test]
    fn test_parse_multi_line_data() {
        let body = "data: line one\ndata: line two\n\n";
        let events = parse_sse_events(body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line one\nline two");
    }

    #[test]
    fn test_comments_and_empty_events_skipped() {
        let body = ": keep-alive\n\n: another comment\n\ndata: real\n\n";
        let events = parse_sse_events(body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "real");
    }

    #[test]
    fn test_event_without_data_dropped() {
        let body = "event: ping\n\n";
        assert!(parse_sse_events(body).is_empty());
    }

    #[test]
    fn test_data_value_space_stripping() {
        let body = "data:no-space\n\ndata: one-space\n\n";
        let events = parse_sse_events(body);
        assert_eq!(events[0].data, "no-space");
        assert_eq!(events[1].data, "one-space");
    }

    // ── Status classification ─────────────────────────────────

    #[test]
    fn test_client_errors_are_permanent() {
        let err = classify_http_status(reqwest::StatusCode::FORBIDDEN);
        assert!(err.to_string().contains("permanent"));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = classify_http_status(reqwest::StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("retryable"));
    }

    // ── URL handling ──────────────────────────────────────────

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let backend = HttpBackend::new(HttpBackendConfig {
            base_url: "https://mcp.example.com/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.endpoint_url(), "https://mcp.example.com/mcp");
    }
}
