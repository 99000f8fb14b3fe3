//! veil: a transparent PII-redacting MCP proxy.
//!
//! Sits between an LLM client and an upstream MCP server. Tool-call and
//! resource-read responses are scanned for PII and payment-card data,
//! masked in place, and only then forwarded; every tool invocation emits a
//! structured audit record after redaction.
//!
//! Configured entirely from the environment; see
//! [`ProxyConfig`](veil_types::config::ProxyConfig).

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use veil_proxy::backend::{HttpBackend, HttpBackendConfig, StdioBackend};
use veil_proxy::{JsonLineSink, VeilProxy};
use veil_redact::{get_profile, NerRedactor};
use veil_types::config::{ProxyConfig, UpstreamTarget};
use veil_types::errors::VeilError;
use veil_types::traits::{Backend, NerClient};

mod comprehend;
mod serve;

#[tokio::main]
async fn main() -> ExitCode {
    // stdout is the MCP wire; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match ProxyConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "proxy terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ProxyConfig) -> Result<(), VeilError> {
    let backend: Arc<dyn Backend> = match &config.upstream {
        UpstreamTarget::Command { command, args } => {
            Arc::new(StdioBackend::spawn(command, args).await?)
        }
        UpstreamTarget::Url(url) => Arc::new(
            HttpBackend::connect(HttpBackendConfig {
                base_url: url.clone(),
                ..Default::default()
            })
            .await?,
        ),
    };

    let profile = get_profile(&config.compliance_profile);

    let ner = if config.comprehend_enabled {
        let client: Arc<dyn NerClient> =
            Arc::new(comprehend::ComprehendClient::from_env(&config.aws_region)?);
        Some(Arc::new(NerRedactor::new(
            client,
            profile.ner_entity_types().iter().copied(),
        )))
    } else {
        None
    };

    info!(
        profile = profile.name,
        stage2 = ner.is_some(),
        audit = config.audit_enabled,
        "starting veil proxy"
    );

    let sink = Arc::new(JsonLineSink::stderr(config.audit_enabled));
    let proxy = VeilProxy::new(backend, profile, ner, sink);

    serve::serve_stdio(proxy).await
}
