//! Request and response envelopes exchanged with the upstream MCP server.
//!
//! The proxy core never sees wire framing, only these already-parsed shapes.
//! `ToolRequest` carries a write-once [`AnnotationSlot`] so the PII middleware
//! can publish its [`RedactionSummary`] to the audit middleware without the
//! layers sharing any other state.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::redaction::RedactionSummary;

/// Write-once side channel between the PII layer and the audit layer.
///
/// Cloning produces another handle to the same slot, so the audit layer can
/// keep a handle while the request itself travels down the onion. The first
/// `record` wins; later writes are rejected, which enforces the "audit reads
/// exactly what PII wrote, once" contract structurally.
#[derive(Clone, Debug, Default)]
pub struct AnnotationSlot(Arc<OnceLock<RedactionSummary>>);

impl AnnotationSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a summary. Returns `false` if the slot was already written.
    pub fn record(&self, summary: RedactionSummary) -> bool {
        self.0.set(summary).is_ok()
    }

    /// Read the published summary, if any.
    pub fn snapshot(&self) -> Option<RedactionSummary> {
        self.0.get().cloned()
    }
}

/// A tool invocation on its way to the upstream server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Name of the upstream tool to invoke.
    pub tool_name: String,
    /// Invocation arguments as a JSON value (an object on the wire).
    #[serde(default)]
    pub arguments: serde_json::Value,
    /// Per-request annotation slot. Not part of the wire shape.
    #[serde(skip)]
    pub annotations: AnnotationSlot,
}

impl ToolRequest {
    /// Build a request with a fresh annotation slot.
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            annotations: AnnotationSlot::new(),
        }
    }
}

/// One block of a tool response's content sequence.
///
/// Only `text` blocks are subject to redaction; the other variants are opaque
/// carriers that pass through the PII middleware untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text produced by the tool.
    Text {
        /// The text payload.
        text: String,
    },
    /// Base64 image data.
    Image {
        /// Encoded payload.
        data: String,
        /// Media type of the payload.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Base64 audio data.
    Audio {
        /// Encoded payload.
        data: String,
        /// Media type of the payload.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource, kept opaque.
    Resource {
        /// The raw embedded resource object.
        resource: serde_json::Value,
    },
}

/// Response to a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Ordered content blocks. `None` is the legacy response shape, which the
    /// middleware passes through unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentBlock>>,
    /// Whether the tool reported an error. Error payloads are treated as
    /// non-PII by contract.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

/// A resource read on its way to the upstream server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// URI of the resource to read.
    pub uri: String,
}

/// One item of a resource response. Text items are redacted; blobs pass
/// through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceItem {
    /// Textual resource content.
    Text {
        /// URI this content belongs to.
        uri: String,
        /// Media type, when the server reports one.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// The text payload.
        text: String,
    },
    /// Opaque binary resource content.
    Blob {
        /// URI this content belongs to.
        uri: String,
        /// Media type, when the server reports one.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Base64 payload, never scanned.
        blob: String,
    },
}

/// Response to a resource read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse {
    /// Ordered resource items.
    pub contents: Vec<ResourceItem>,
}
