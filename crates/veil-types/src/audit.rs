//! Audit record types for the JSONL audit stream.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Outcome of an audited tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// The invocation completed and the tool did not report an error.
    Success,
    /// The invocation failed or the tool reported an error response.
    Error,
}

/// One record per tool invocation, emitted after redaction so the audit
/// stream never contains raw PII.
///
/// Field order is the wire order: entries serialize to exactly one JSON
/// object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// UTC wall-clock time of emission, serialized with millisecond
    /// precision and a `Z` suffix.
    #[serde(serialize_with = "serialize_millis_utc")]
    pub timestamp: DateTime<Utc>,
    /// Name of the upstream tool that was invoked.
    pub upstream_tool: String,
    /// Name of the active compliance profile.
    pub compliance_profile: String,
    /// Serialized invocation arguments, truncated by the audit layer.
    pub input_parameters: String,
    /// UTF-8 byte size of the serialized (post-redaction) response.
    pub output_size_bytes: usize,
    /// Number of values masked while processing the response.
    pub redaction_count: usize,
    /// Sorted category tags of the masked values.
    pub redacted_types: Vec<String>,
    /// Wall-clock execution time of the inner call, in milliseconds.
    pub execution_time_ms: u64,
    /// Invocation outcome.
    pub status: AuditStatus,
    /// Error message, present only for failed invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn serialize_millis_utc<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}
