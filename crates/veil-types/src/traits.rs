/// Trait contracts for the veil subsystems.
///
/// Every crate codes against these interfaces rather than against concrete
/// types. All traits live here so the redaction engine, the middleware stack,
/// and the server binary can depend on them without circular dependencies.
use async_trait::async_trait;

use crate::audit::AuditEntry;
use crate::envelope::{ResourceRequest, ResourceResponse, ToolRequest, ToolResponse};
use crate::errors::VeilError;
use crate::redaction::PiiEntity;

// ============================================================
// Upstream Backend
// ============================================================

/// Opaque handle to the upstream MCP server.
///
/// Transport selection (spawned subprocess over stdio vs HTTP/SSE) lives
/// behind this trait; the pipelines only ever "send request, get response".
/// Implementations are shared across concurrent requests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Invoke a tool on the upstream server.
    async fn call_tool(&self, request: ToolRequest) -> Result<ToolResponse, VeilError>;

    /// Read a resource from the upstream server.
    async fn read_resource(&self, request: ResourceRequest)
        -> Result<ResourceResponse, VeilError>;

    /// Fetch the upstream tool catalog, forwarded verbatim to the client.
    async fn list_tools(&self) -> Result<serde_json::Value, VeilError>;
}

// ============================================================
// NER Provider
// ============================================================

/// Handle to the contextual PII detection provider.
///
/// Implementations must be safe to invoke concurrently from multiple tasks.
/// Offsets reported by `detect_pii` are byte positions into the exact `text`
/// argument; the NER wrapper validates them and treats anything it cannot
/// interpret as an unusable response.
#[async_trait]
pub trait NerClient: Send + Sync {
    /// Cheap probe: which PII labels, if any, does this text contain?
    ///
    /// An empty result lets the caller skip the more expensive span
    /// detection entirely.
    async fn contains_pii(&self, text: &str, language: &str) -> Result<Vec<String>, VeilError>;

    /// Locate PII entity spans in this text.
    async fn detect_pii(&self, text: &str, language: &str) -> Result<Vec<PiiEntity>, VeilError>;
}

// ============================================================
// Audit Sink
// ============================================================

/// Write-out for audit entries.
///
/// Deliberately synchronous: a sink writes one full line at a time and
/// returns, so concurrent requests cannot interleave partial entries. When
/// audit is disabled the sink is a no-op; timing and summary collection
/// still happen upstream of it.
pub trait AuditSink: Send + Sync {
    /// Emit one entry. Implementations must write atomically per entry.
    fn emit(&self, entry: &AuditEntry) -> Result<(), VeilError>;
}
