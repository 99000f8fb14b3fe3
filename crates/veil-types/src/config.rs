//! Environment-driven proxy configuration.
//!
//! The proxy is configured entirely from environment variables. Exactly one
//! upstream target is required; everything else has a safe default.

use crate::errors::VeilError;

/// How to reach the upstream MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamTarget {
    /// Spawn a subprocess and speak JSON-RPC over its stdio.
    Command {
        /// Executable to spawn.
        command: String,
        /// Arguments, whitespace-split from `UPSTREAM_MCP_ARGS`.
        args: Vec<String>,
    },
    /// POST JSON-RPC to a remote HTTP/SSE endpoint.
    Url(String),
}

/// Validated proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// The upstream backend target.
    pub upstream: UpstreamTarget,
    /// Compliance profile name. Unknown names fall back to GDPR with a
    /// warning at profile lookup time, not here.
    pub compliance_profile: String,
    /// Whether audit entries are emitted. The literal `false` disables.
    pub audit_enabled: bool,
    /// Whether stage-2 NER redaction is available. The literal `true` enables.
    pub comprehend_enabled: bool,
    /// AWS region for the NER client.
    pub aws_region: String,
}

impl ProxyConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, VeilError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an injected variable lookup.
    ///
    /// Tests pass a map-backed closure to stay independent of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VeilError> {
        let upstream = match (lookup("UPSTREAM_MCP_COMMAND"), lookup("UPSTREAM_MCP_URL")) {
            // When both are set, the subprocess command wins.
            (Some(command), _) => {
                let args = lookup("UPSTREAM_MCP_ARGS")
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(String::from)
                    .collect();
                UpstreamTarget::Command { command, args }
            }
            (None, Some(url)) => UpstreamTarget::Url(url),
            (None, None) => {
                return Err(VeilError::Config(
                    "no upstream target: set UPSTREAM_MCP_COMMAND or UPSTREAM_MCP_URL".to_string(),
                ))
            }
        };

        Ok(Self {
            upstream,
            compliance_profile: lookup("COMPLIANCE_PROFILE").unwrap_or_else(|| "GDPR".to_string()),
            audit_enabled: lookup("AUDIT_ENABLED").as_deref() != Some("false"),
            comprehend_enabled: lookup("COMPREHEND_ENABLED").as_deref() == Some("true"),
            aws_region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        })
    }
}
