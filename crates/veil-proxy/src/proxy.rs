//! Pipeline assembly: the proxy facade the serve loop talks to.

use std::sync::Arc;

use async_trait::async_trait;

use veil_redact::{ComplianceProfile, NerRedactor, PatternEngine};
use veil_types::envelope::{ResourceRequest, ResourceResponse, ToolRequest, ToolResponse};
use veil_types::errors::VeilError;
use veil_types::traits::{AuditSink, Backend};

use crate::audit::AuditLayer;
use crate::pii::{PiiResourceLayer, PiiToolLayer};
use crate::pipeline::{Layer, Pipeline, Terminal};

/// Terminal adapter: tool pipeline onto the backend handle.
struct ToolBackendTerminal(Arc<dyn Backend>);

#[async_trait]
impl Terminal<ToolRequest, ToolResponse> for ToolBackendTerminal {
    async fn call(&self, request: ToolRequest) -> Result<ToolResponse, VeilError> {
        self.0.call_tool(request).await
    }
}

/// Terminal adapter: resource pipeline onto the backend handle.
struct ResourceBackendTerminal(Arc<dyn Backend>);

#[async_trait]
impl Terminal<ResourceRequest, ResourceResponse> for ResourceBackendTerminal {
    async fn call(&self, request: ResourceRequest) -> Result<ResourceResponse, VeilError> {
        self.0.read_resource(request).await
    }
}

/// The assembled proxy: both pipelines composed over one backend handle.
///
/// ```text
/// Tool pipeline:     audit > pii-tool > backend
/// Resource pipeline:         pii-resource > backend
/// ```
///
/// The audit layer is outermost on the tool pipeline so it only ever
/// observes redacted responses. The resource pipeline carries no audit
/// layer.
pub struct VeilProxy {
    tools: Pipeline<ToolRequest, ToolResponse>,
    resources: Pipeline<ResourceRequest, ResourceResponse>,
    backend: Arc<dyn Backend>,
}

impl VeilProxy {
    /// Assemble the pipelines.
    ///
    /// `ner` is `None` when the NER feature flag is off; stage 2 is then
    /// skipped regardless of the profile.
    pub fn new(
        backend: Arc<dyn Backend>,
        profile: &'static ComplianceProfile,
        ner: Option<Arc<NerRedactor>>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let engine = Arc::new(PatternEngine::new());

        let tools = Pipeline::new(
            vec![
                Arc::new(AuditLayer::new(sink, profile.name))
                    as Arc<dyn Layer<ToolRequest, ToolResponse>>,
                Arc::new(PiiToolLayer::new(engine.clone(), ner.clone(), profile)),
            ],
            Arc::new(ToolBackendTerminal(backend.clone())),
        );

        let resources = Pipeline::new(
            vec![Arc::new(PiiResourceLayer::new(engine, ner, profile))
                as Arc<dyn Layer<ResourceRequest, ResourceResponse>>],
            Arc::new(ResourceBackendTerminal(backend.clone())),
        );

        Self {
            tools,
            resources,
            backend,
        }
    }

    /// Invoke a tool through the full tool pipeline.
    pub async fn call_tool(&self, request: ToolRequest) -> Result<ToolResponse, VeilError> {
        self.tools.run(request).await
    }

    /// Read a resource through the resource pipeline.
    pub async fn read_resource(
        &self,
        request: ResourceRequest,
    ) -> Result<ResourceResponse, VeilError> {
        self.resources.run(request).await
    }

    /// Forward the upstream tool catalog verbatim.
    pub async fn list_tools(&self) -> Result<serde_json::Value, VeilError> {
        self.backend.list_tools().await
    }
}
