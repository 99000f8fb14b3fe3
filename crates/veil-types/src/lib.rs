/// Shared types, traits, and errors for the veil proxy.
///
/// This crate is the foundation that all other veil crates depend on.
/// It contains:
/// - **Request/response envelopes** (`envelope`) exchanged with the upstream server
/// - **Redaction state** (`redaction`) produced by the PII engine and read by audit
/// - **Audit record types** (`audit`) for the JSONL audit stream
/// - **JSON-RPC framing types** (`rpc`) shared by backends and the serve loop
/// - **Trait contracts** (`traits`) that define the seams between subsystems
/// - **Error types** (`errors`) for unified error handling
/// - **Config types** (`config`) for environment-driven configuration
pub mod audit;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod redaction;
pub mod rpc;
pub mod traits;

// Re-export commonly used types at the crate root for convenience.
pub use audit::{AuditEntry, AuditStatus};
pub use config::{ProxyConfig, UpstreamTarget};
pub use envelope::{
    AnnotationSlot, ContentBlock, ResourceItem, ResourceRequest, ResourceResponse, ToolRequest,
    ToolResponse,
};
pub use errors::VeilError;
pub use redaction::{PiiEntity, RedactionSummary};
pub use rpc::{JsonRpcError, JsonRpcMessage};
pub use traits::*;
