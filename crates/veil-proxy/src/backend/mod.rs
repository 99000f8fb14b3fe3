/// Upstream backend implementations.
///
/// Two transports behind the same [`Backend`](veil_types::traits::Backend)
/// trait:
/// - **stdio**: spawn the upstream server as a child process, line-framed
///   JSON-RPC over its stdin/stdout
/// - **http**: POST JSON-RPC to a remote endpoint, with SSE response
///   support and MCP session tracking
pub mod http;
pub mod stdio;

pub use http::{HttpBackend, HttpBackendConfig};
pub use stdio::StdioBackend;

use serde::de::DeserializeOwned;

use veil_types::errors::VeilError;

/// Decode a JSON-RPC result payload into the expected response shape.
pub(crate) fn parse_result<T: DeserializeOwned>(
    method: &str,
    result: serde_json::Value,
) -> Result<T, VeilError> {
    serde_json::from_value(result)
        .map_err(|e| VeilError::Upstream(format!("unparseable {method} result from upstream: {e}")))
}
