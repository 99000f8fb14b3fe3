//! Stdio backend: the upstream MCP server as a child process.
//!
//! - JSON-RPC message framing, one JSON object per line
//! - child process lifecycle management, killed when the backend drops
//! - stderr capture forwarded to diagnostics

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use veil_types::envelope::{ResourceRequest, ResourceResponse, ToolRequest, ToolResponse};
use veil_types::errors::VeilError;
use veil_types::rpc::JsonRpcMessage;
use veil_types::traits::Backend;

/// Exclusive access to the child's pipes plus the id counter, so a request
/// and its response line cannot interleave with another request.
struct ChildChannel {
    // Held so the process is killed when the backend drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

/// Backend that spawns the upstream command and speaks line-framed JSON-RPC
/// over its stdio.
pub struct StdioBackend {
    channel: Mutex<ChildChannel>,
}

impl StdioBackend {
    /// Spawn the upstream command and run the MCP initialize handshake.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self, VeilError> {
        info!(command = %command, "spawning upstream MCP server");

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VeilError::Upstream(format!("failed to spawn upstream '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VeilError::Upstream("upstream stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VeilError::Upstream("upstream stdout unavailable".to_string()))?;

        // Forward upstream stderr to our diagnostics so server-side failures
        // are visible without mixing into the wire.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(line = %line, "upstream stderr");
                }
            });
        }

        let backend = Self {
            channel: Mutex::new(ChildChannel {
                _child: child,
                stdin,
                stdout: BufReader::new(stdout),
                next_id: 0,
            }),
        };

        backend.initialize().await?;
        Ok(backend)
    }

    /// MCP handshake: `initialize` request, then the `initialized`
    /// notification.
    async fn initialize(&self) -> Result<(), VeilError> {
        self.request(
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
        self.notify("notifications/initialized", json!({})).await?;
        info!("upstream MCP server initialized");
        Ok(())
    }

    /// Send one request and read lines until its response arrives.
    ///
    /// Notifications and responses with unrelated ids are skipped; an error
    /// object becomes a [`VeilError::Upstream`].
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, VeilError> {
        let mut channel = self.channel.lock().await;
        channel.next_id += 1;
        let id = channel.next_id;

        let message = JsonRpcMessage::request(json!(id), method, Some(params));
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        channel
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| VeilError::Upstream(format!("failed to write to upstream: {e}")))?;
        channel
            .stdin
            .flush()
            .await
            .map_err(|e| VeilError::Upstream(format!("failed to flush upstream stdin: {e}")))?;

        loop {
            let mut buffer = String::new();
            let read = channel
                .stdout
                .read_line(&mut buffer)
                .await
                .map_err(|e| VeilError::Upstream(format!("failed to read from upstream: {e}")))?;
            if read == 0 {
                return Err(VeilError::Upstream(
                    "upstream closed its stdout".to_string(),
                ));
            }

            let trimmed = buffer.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response: JsonRpcMessage = match serde_json::from_str(trimmed) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "skipping unparseable line from upstream");
                    continue;
                }
            };

            if response.id.as_ref() != Some(&json!(id)) {
                // Notification or a response to someone else's request.
                continue;
            }

            if let Some(error) = response.error {
                return Err(VeilError::Upstream(format!(
                    "upstream returned error for {method}: {} (code {})",
                    error.message, error.code
                )));
            }

            return Ok(response.result.unwrap_or(serde_json::Value::Null));
        }
    }

    /// Send a notification; no response is expected.
    async fn notify(&self, method: &str, params: serde_json::Value) -> Result<(), VeilError> {
        let mut channel = self.channel.lock().await;
        let message = JsonRpcMessage::notification(method, Some(params));
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        channel
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| VeilError::Upstream(format!("failed to write to upstream: {e}")))?;
        channel
            .stdin
            .flush()
            .await
            .map_err(|e| VeilError::Upstream(format!("failed to flush upstream stdin: {e}")))
    }
}

#[async_trait]
impl Backend for StdioBackend {
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
