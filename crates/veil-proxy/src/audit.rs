//! Audit middleware: one structured record per tool invocation.
//!
//! Outermost layer of the tool pipeline. It starts timing before any inner
//! layer runs and emits after the PII layer has finished mutating the
//! response, so the audit stream never contains raw PII. That ordering comes
//! from pipeline composition, not from convention.
//!
//! Per-request state machine:
//!
//! ```text
//!  START -> TIMING -> next --+-- error  -> LOG_ERROR -> RETHROW
//!                            +-- result -> READ_META -> LOG -> RETURN
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::error;

use veil_types::audit::{AuditEntry, AuditStatus};
use veil_types::envelope::{ToolRequest, ToolResponse};
use veil_types::errors::VeilError;
use veil_types::traits::AuditSink;

use crate::pipeline::{Layer, Next};

/// Byte cap for the serialized input parameters of an audit entry.
pub const MAX_INPUT_PARAMETERS_BYTES: usize = 500;

/// Suffix appended when input parameters are cut at the cap.
pub const TRUNCATION_SUFFIX: &str = "...[truncated]";

/// Times the inner call, reads the redaction annotation, and emits exactly
/// one [`AuditEntry`] per invocation, error paths included.
pub struct AuditLayer {
    sink: Arc<dyn AuditSink>,
    profile_name: String,
}

impl AuditLayer {
    /// Build the middleware for a sink and the active profile name.
    pub fn new(sink: Arc<dyn AuditSink>, profile_name: impl Into<String>) -> Self {
        Self {
            sink,
            profile_name: profile_name.into(),
        }
    }

    /// Emit an entry. A failing sink is reported to diagnostics and never
    /// changes the outcome of the request it describes.
    fn emit(&self, entry: AuditEntry) {
        if let Err(err) = self.sink.emit(&entry) {
            error!(error = %err, "failed to emit audit entry");
        }
    }
}

/// Serialize invocation arguments, cut at the byte cap on a character
/// boundary with a literal truncation marker.
fn serialize_input_parameters(arguments: &serde_json::Value) -> String {
    let serialized = arguments.to_string();
    if serialized.len() <= MAX_INPUT_PARAMETERS_BYTES {
        return serialized;
    }
    let mut end = MAX_INPUT_PARAMETERS_BYTES;
    while !serialized.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &serialized[..end], TRUNCATION_SUFFIX)
}

#[async_trait]
impl Layer<ToolRequest, ToolResponse> for AuditLayer {
    async fn handle(
        &self,
        request: ToolRequest,
        next: Next<'_, ToolRequest, ToolResponse>,
    ) -> Result<ToolResponse, VeilError> {
        let started = Instant::now();
        let upstream_tool = request.tool_name.clone();
        let input_parameters = serialize_input_parameters(&request.arguments);
        let annotations = request.annotations.clone();

        match next.run(request).await {
            Err(err) => {
                self.emit(AuditEntry {
                    timestamp: Utc::now(),
                    upstream_tool,
                    compliance_profile: self.profile_name.clone(),
                    input_parameters,
                    output_size_bytes: 0,
                    redaction_count: 0,
                    redacted_types: Vec::new(),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    status: AuditStatus::Error,
                    error: Some(err.to_string()),
                });
                Err(err)
            }
            Ok(response) => {
                // Absence of an annotation (legacy responses) reads as zero.
                let summary = annotations.snapshot().unwrap_or_default();
                let output_size_bytes = serde_json::to_vec(&response)
                    .map(|body| body.len())
                    .unwrap_or(0);
                let status = if response.is_error {
                    AuditStatus::Error
                } else {
                    AuditStatus::Success
                };
                self.emit(AuditEntry {
                    timestamp: Utc::now(),
                    upstream_tool,
                    compliance_profile: self.profile_name.clone(),
                    input_parameters,
                    output_size_bytes,
                    redaction_count: summary.count,
                    redacted_types: summary.types.into_iter().collect(),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    status,
                    error: None,
                });
                Ok(response)
            }
        }
    }
}
