//! Routes agent tool calls through the permission policy to local lookup
//! tools or the remote payment server.

use std::sync::Arc;

use payrelay_mcp::McpToolClient;
use serde_json::Value;
use tracing::{info, warn};

use crate::guardrails::{PermissionContext, PermissionDecision, ToolPermissionPolicy};
use crate::llm::ToolDefinition;
use crate::tools::ToolRegistry;

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub decision: PermissionDecision,
    pub output: String,
    pub is_error: bool,
}

impl ToolInvocation {
    fn error(call: &ToolCall, decision: PermissionDecision, output: String) -> Self {
        Self { tool_name: call.name.clone(), decision, output, is_error: true }
    }
}

pub struct ToolGateway {
    server_name: String,
    policy: ToolPermissionPolicy,
    registry: ToolRegistry,
    remote: Option<Arc<dyn McpToolClient>>,
}

impl ToolGateway {
    pub fn new(server_name: &str, policy: ToolPermissionPolicy, registry: ToolRegistry) -> Self {
        Self { server_name: server_name.to_string(), policy, registry, remote: None }
    }

    pub fn with_remote(mut self, remote: Arc<dyn McpToolClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// `connected` only when the payment server finished its handshake.
    pub fn remote_status(&self) -> &'static str {
        match &self.remote {
            Some(remote) => remote.state().status_label(),
            None => "failed",
        }
    }

    fn remote_prefix(&self) -> String {
        format!("mcp__{}__", self.server_name)
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.registry.definitions();
        if let Some(remote) = &self.remote {
            let prefix = self.remote_prefix();
            definitions.extend(remote.tools().iter().map(|tool| ToolDefinition {
                name: format!("{prefix}{}", tool.name),
                description: tool.description.clone().unwrap_or_else(|| {
                    format!("{} tool `{}`", self.server_name, tool.name)
                }),
                input_schema: tool.input_schema.clone(),
            }));
        }
        definitions
    }

    pub async fn invoke(&self, call: &ToolCall, context: &PermissionContext) -> ToolInvocation {
        info!(
            event_name = "agent.tool.requested",
            correlation_id = %context.correlation_id,
            tool_name = %call.name,
            input = %call.input,
            "agent is using tool"
        );

        let decision = self.policy.evaluate(&call.name, &call.input, context);
        let input = match &decision {
            PermissionDecision::Allow { updated_input } => updated_input.clone(),
            PermissionDecision::Deny { reason_code, message } => {
                warn!(
                    event_name = "agent.tool.denied",
                    correlation_id = %context.correlation_id,
                    tool_name = %call.name,
                    reason_code,
                    "tool call denied"
                );
                let message = message.clone();
                return ToolInvocation::error(call, decision, message);
            }
        };

        if let Some(tool) = self.registry.get(&call.name) {
            return match tool.execute(input).await {
                Ok(output) => ToolInvocation {
                    tool_name: call.name.clone(),
                    decision,
                    output: output.to_string(),
                    is_error: false,
                },
                Err(error) => ToolInvocation::error(call, decision, error.to_string()),
            };
        }

        let Some(remote_name) = call.name.strip_prefix(&self.remote_prefix()) else {
            return ToolInvocation::error(call, decision, format!("Unknown tool: {}", call.name));
        };
        let Some(remote) = &self.remote else {
            return ToolInvocation::error(
                call,
                decision,
                format!("{} payment server is not connected", self.server_name),
            );
        };

        match remote.call_tool(remote_name, input).await {
            Ok(result) => {
                let is_error = result.is_error;
                ToolInvocation { tool_name: call.name.clone(), decision, output: result.text(), is_error }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.remote_failed",
                    correlation_id = %context.correlation_id,
                    tool_name = %call.name,
                    error = %error,
                    "remote tool call failed"
                );
                ToolInvocation::error(call, decision, error.to_string())
            }
        }
    }
}
