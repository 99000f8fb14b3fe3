//! PII redaction middlewares for the tool and resource pipelines.
//!
//! Both middlewares run after the inner call returns: stage 1 (deterministic
//! patterns) first, then stage 2 (NER) on the already-masked text, so a value
//! the patterns caught is never re-submitted to the provider in raw form.
//! Content blocks are processed in order; nothing is returned until every
//! block is done, so a cancelled request never yields a half-processed
//! response.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use veil_redact::{ComplianceProfile, NerRedactor, PatternEngine};
use veil_types::envelope::{
    ContentBlock, ResourceItem, ResourceRequest, ResourceResponse, ToolRequest, ToolResponse,
};
use veil_types::errors::VeilError;
use veil_types::redaction::RedactionSummary;

use crate::pipeline::{Layer, Next};

/// Opaque replacement for a content block whose masking failed. Leaking the
/// raw text is never an option.
pub const REDACTION_PLACEHOLDER: &str = "[REDACTED:UNAVAILABLE]";

/// The two redaction stages plus the profile that gates them.
///
/// `ner` is `None` when the runtime feature flag is off; stage 2 then stays
/// skipped regardless of what the profile asks for.
struct RedactionStages {
    engine: Arc<PatternEngine>,
    ner: Option<Arc<NerRedactor>>,
    profile: &'static ComplianceProfile,
}

impl RedactionStages {
    /// Run the configured stages over one text value. Stage 1 is fully
    /// applied before stage 2 sees the string.
    async fn redact_text(
        &self,
        text: &str,
        summary: &mut RedactionSummary,
    ) -> Result<String, VeilError> {
        let mut current = text.to_string();

        if self.profile.stage1 {
            let (masked, part) = self.engine.redact_string(&current);
            current = masked;
            summary.absorb(part);
        }

        if self.profile.stage2 {
            if let Some(ner) = &self.ner {
                let (masked, part) = ner.redact_text(&current).await?;
                current = masked;
                summary.absorb(part);
            }
        }

        Ok(current)
    }
}

// ============================================================
// Tool middleware
// ============================================================

/// Redacts tool responses and publishes a [`RedactionSummary`] through the
/// request's annotation slot for the audit layer.
pub struct PiiToolLayer {
    stages: RedactionStages,
}

impl PiiToolLayer {
    /// Build the middleware for a profile. Pass `ner: None` when the NER
    /// feature flag is disabled.
    pub fn new(
        engine: Arc<PatternEngine>,
        ner: Option<Arc<NerRedactor>>,
        profile: &'static ComplianceProfile,
    ) -> Self {
        Self {
            stages: RedactionStages {
                engine,
                ner,
                profile,
            },
        }
    }
}

#[async_trait]
impl Layer<ToolRequest, ToolResponse> for PiiToolLayer {
    async fn handle(
        &self,
        request: ToolRequest,
        next: Next<'_, ToolRequest, ToolResponse>,
    ) -> Result<ToolResponse, VeilError> {
        let annotations = request.annotations.clone();
        let response = next.run(request).await?;

        // Legacy responses without a content sequence pass through as-is.
        let content = match response.content {
            Some(content) => content,
            None => return Ok(response),
        };

        let mut summary = RedactionSummary::new();

        // Tool error payloads are bounded human-readable strings, treated
        // as non-PII by contract; masking them would mangle diagnostics.
        if response.is_error {
            annotations.record(summary);
            return Ok(ToolResponse {
                content: Some(content),
                is_error: true,
            });
        }

        let mut blocks = Vec::with_capacity(content.len());
        for block in content {
            match block {
                ContentBlock::Text { text } => {
                    let masked = match self.stages.redact_text(&text, &mut summary).await {
                        Ok(masked) => masked,
                        Err(VeilError::Masking(reason)) => {
                            warn!(
                                reason = %reason,
                                "masking failed, replacing content block with placeholder"
                            );
                            REDACTION_PLACEHOLDER.to_string()
                        }
                        Err(err) => return Err(err),
                    };
                    blocks.push(ContentBlock::Text { text: masked });
                }
                other => blocks.push(other),
            }
        }

        annotations.record(summary);
        Ok(ToolResponse {
            content: Some(blocks),
            is_error: false,
        })
    }
}

// ============================================================
// Resource middleware
// ============================================================

/// Redacts resource read responses. Resources are static reference content;
/// no annotation is attached because the resource pipeline carries no audit
/// layer.
pub struct PiiResourceLayer {
    stages: RedactionStages,
}

impl PiiResourceLayer {
    /// Build the middleware for a profile. Pass `ner: None` when the NER
    /// feature flag is disabled.
    pub fn new(
        engine: Arc<PatternEngine>,
        ner: Option<Arc<NerRedactor>>,
        profile: &'static ComplianceProfile,
    ) -> Self {
        Self {
            stages: RedactionStages {
                engine,
                ner,
                profile,
            },
        }
    }
}

#[async_trait]
impl Layer<ResourceRequest, ResourceResponse> for PiiResourceLayer {
    async fn handle(
        &self,
        request: ResourceRequest,
        next: Next<'_, ResourceRequest, ResourceResponse>,
    ) -> Result<ResourceResponse, VeilError> {
        let response = next.run(request).await?;

        let mut summary = RedactionSummary::new();
        let mut contents = Vec::with_capacity(response.contents.len());
        for item in response.contents {
            match item {
                ResourceItem::Text {
                    uri,
                    mime_type,
                    text,
                } => {
                    let masked = match self.stages.redact_text(&text, &mut summary).await {
                        Ok(masked) => masked,
                        Err(VeilError::Masking(reason)) => {
                            warn!(
                                reason = %reason,
                                uri = %uri,
                                "masking failed, replacing resource text with placeholder"
                            );
                            REDACTION_PLACEHOLDER.to_string()
                        }
                        Err(err) => return Err(err),
                    };
                    contents.push(ResourceItem::Text {
                        uri,
                        mime_type,
                        text: masked,
                    });
                }
                blob @ ResourceItem::Blob { .. } => contents.push(blob),
            }
        }

        Ok(ResourceResponse { contents })
    }
}
