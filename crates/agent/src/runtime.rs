//! Wires an [`AgentSession`] from configuration. Shared by the server and
//! the command line so both run requests the same way.

use std::sync::Arc;
use std::time::Duration;

use payrelay_core::config::{AppConfig, PaymentConfig};
use payrelay_core::{prompts, LookupStore, PromptError, PromptRenderer};
use payrelay_mcp::{HttpTransport, McpClient, McpToolClient};
use thiserror::Error;
use tracing::{info, warn};

use crate::gateway::ToolGateway;
use crate::guardrails::ToolPermissionPolicy;
use crate::llm::{AnthropicClient, LlmClient, LlmError};
use crate::ocr::ReceiptTextExtractor;
use crate::session::{AgentSession, SessionSettings};
use crate::tools::ToolRegistry;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

pub struct AgentRuntime {
    pub session: Arc<AgentSession>,
    pub lookup: LookupStore,
    /// `None` when receipt OCR is disabled.
    pub ocr: Option<Arc<ReceiptTextExtractor>>,
    pub payment_status: &'static str,
}

impl AgentRuntime {
    /// Builds the runtime. An unreachable payment server is logged, not fatal:
    /// sessions then report it in their init turn.
    pub async fn from_config(config: &AppConfig) -> Result<Self, RuntimeError> {
        let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(
            &config.llm.api_key,
            &config.llm.base_url,
            Duration::from_secs(config.llm.timeout_secs),
        )?);
        let remote = connect_payment_server(&config.payment).await;
        Self::assemble(config, llm, remote)
    }

    /// Same as [`AgentRuntime::from_config`] with the collaborators supplied.
    pub fn assemble(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        remote: Option<Arc<dyn McpToolClient>>,
    ) -> Result<Self, RuntimeError> {
        let lookup = LookupStore::new(config.lookup.data_dir.clone());
        for check in lookup.check_files() {
            if let Err(error) = check.result {
                warn!(
                    event_name = "system.lookup.unavailable",
                    correlation_id = "bootstrap",
                    file = check.file,
                    path = %check.path.display(),
                    error = %error,
                    "lookup file is not readable"
                );
            }
        }

        let server_name = config.payment.server_name.as_str();
        let mut gateway = ToolGateway::new(
            server_name,
            ToolPermissionPolicy::for_server(server_name),
            ToolRegistry::with_lookup_tools(lookup.clone()),
        );
        if let Some(remote) = remote {
            gateway = gateway.with_remote(remote);
        }
        let payment_status = gateway.remote_status();

        let renderer = PromptRenderer::load(config.relay.prompt_template_path.as_deref())?;
        let session = AgentSession::new(
            llm.clone(),
            Arc::new(gateway),
            Arc::new(renderer),
            SessionSettings {
                model: config.llm.model.clone(),
                max_tokens: config.llm.max_tokens,
                max_turns: config.llm.max_turns,
            },
        );

        let ocr = if config.ocr.enabled {
            let prompt = prompts::ocr_prompt(config.ocr.prompt_path.as_deref())?;
            Some(Arc::new(ReceiptTextExtractor::new(llm, config.ocr.model.clone(), prompt)))
        } else {
            None
        };

        Ok(Self { session: Arc::new(session), lookup, ocr, payment_status })
    }
}

pub async fn connect_payment_server(payment: &PaymentConfig) -> Option<Arc<dyn McpToolClient>> {
    let transport = match HttpTransport::new(
        &payment.url,
        payment.api_key.clone(),
        Duration::from_secs(payment.timeout_secs),
    ) {
        Ok(transport) => transport,
        Err(error) => {
            warn!(
                event_name = "system.payment.connect_failed",
                correlation_id = "bootstrap",
                server = %payment.server_name,
                error = %error,
                "payment server transport could not be created"
            );
            return None;
        }
    };

    match McpClient::connect(&payment.server_name, transport).await {
        Ok(client) => {
            info!(
                event_name = "system.payment.connected",
                correlation_id = "bootstrap",
                server = %payment.server_name,
                tool_count = client.tools().len(),
                "payment server connected"
            );
            Some(Arc::new(client))
        }
        Err(error) => {
            warn!(
                event_name = "system.payment.connect_failed",
                correlation_id = "bootstrap",
                server = %payment.server_name,
                auth_failure = error.is_auth_failure(),
                error = %error,
                "payment server unavailable; sessions will report it"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use payrelay_core::config::{ConfigOverrides, LoadOptions};
    use payrelay_core::AppConfig;
    use tempfile::TempDir;

    use super::AgentRuntime;
    use crate::gateway::tests::{lookup_dir, FakePaymentServer};
    use crate::llm::{LlmClient, LlmError, LlmRequest, LlmResponse};

    struct UnusedLlm;

    #[async_trait]
    impl LlmClient for UnusedLlm {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            Err(LlmError::InvalidResponse("not scripted".to_string()))
        }
    }

    fn config(dir: &TempDir, ocr_enabled: bool) -> AppConfig {
        AppConfig::load(LoadOptions {
            config_path: Some(dir.path().join("missing.toml")),
            require_file: false,
            overrides: ConfigOverrides {
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                llm_api_key: Some("sk-ant-test".to_string()),
                lookup_data_dir: Some(dir.path().to_path_buf()),
                ocr_enabled: Some(ocr_enabled),
                ..ConfigOverrides::default()
            },
        })
        .expect("config")
    }

    #[test]
    fn assemble_reports_missing_payment_server() {
        let dir = lookup_dir();
        let runtime = AgentRuntime::assemble(&config(&dir, false), Arc::new(UnusedLlm), None)
            .expect("runtime");
        assert_eq!(runtime.payment_status, "failed");
        assert!(runtime.ocr.is_none());
        assert_eq!(runtime.session.gateway().tool_definitions().len(), 3);
    }

    #[test]
    fn assemble_with_remote_and_ocr() {
        let dir = lookup_dir();
        let runtime = AgentRuntime::assemble(
            &config(&dir, true),
            Arc::new(UnusedLlm),
            Some(Arc::new(FakePaymentServer::ready())),
        )
        .expect("runtime");
        assert_eq!(runtime.payment_status, "connected");
        assert!(runtime.ocr.is_some());
        assert_eq!(runtime.session.gateway().tool_definitions().len(), 4);
    }
}
