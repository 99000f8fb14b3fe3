/// Unified error type for the veil proxy.
///
/// All crates use this error type for propagation across crate boundaries.
/// Internal module errors should be converted into the appropriate variant.
#[derive(Debug, thiserror::Error)]
pub enum VeilError {
    /// Error from configuration loading or validation. Terminal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Error from the upstream backend (spawn failure, transport failure,
    /// or a JSON-RPC error object returned by the server).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error from the NER client (request failure, unusable response).
    #[error("NER error: {0}")]
    Ner(String),

    /// A middleware layer invoked its continuation more than once.
    #[error("middleware protocol misuse: {0}")]
    ProtocolMisuse(String),

    /// Masking could not be applied to a content block. The PII middleware
    /// replaces the block with an opaque placeholder rather than leaking it.
    #[error("masking error: {0}")]
    Masking(String),

    /// Error from the audit sink (serialization or write failure).
    #[error("audit error: {0}")]
    Audit(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for VeilError {
    fn from(err: serde_json::Error) -> Self {
        VeilError::Serialization(err.to_string())
    }
}
