//! Agent session: one LLM conversation per payment request, with tool calls
//! routed through the [`ToolGateway`].

use std::sync::Arc;

use async_trait::async_trait;
use payrelay_core::{PaymentRequest, PromptError, PromptRenderer};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::{ToolCall, ToolGateway};
use crate::guardrails::PermissionContext;
use crate::llm::{ContentBlock, LlmClient, LlmError, LlmRequest, Message, StopReason};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    ErrorMaxTurns,
    /// The reply asked for tools but stopped for another reason, usually
    /// `max_tokens`. Those calls were not run.
    ErrorIncompleteToolUse,
}

impl ResultSubtype {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ErrorMaxTurns => "error_max_turns",
            Self::ErrorIncompleteToolUse => "error_incomplete_tool_use",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolUseSummary {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentTurn {
    Init { mcp_server: String, mcp_status: String, tools: Vec<String> },
    Assistant { text: String, tool_uses: Vec<ToolUseSummary> },
    ToolResult { tool_use_id: String, tool_name: String, output: String, is_error: bool },
    Result { subtype: ResultSubtype, result: String, tools_used: Vec<String>, turns: u32 },
}

impl AgentTurn {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool_result",
            Self::Result { .. } => "result",
        }
    }
}

/// Receives turns as the session produces them.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn on_turn(&self, turn: &AgentTurn);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub subtype: ResultSubtype,
    pub result: String,
    pub tools_used: Vec<String>,
    pub turns: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub max_turns: u32,
}

pub struct AgentSession {
    llm: Arc<dyn LlmClient>,
    gateway: Arc<ToolGateway>,
    prompts: Arc<PromptRenderer>,
    settings: SessionSettings,
}

impl AgentSession {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gateway: Arc<ToolGateway>,
        prompts: Arc<PromptRenderer>,
        settings: SessionSettings,
    ) -> Self {
        Self { llm, gateway, prompts, settings }
    }

    pub fn gateway(&self) -> &ToolGateway {
        &self.gateway
    }

    pub async fn run(
        &self,
        request: &PaymentRequest,
        sink: &dyn TurnSink,
    ) -> Result<SessionOutcome, SessionError> {
        let correlation_id = request.correlation_id();
        let prompt = self.prompts.render_payment(request, self.gateway.server_name())?;
        let tools = self.gateway.tool_definitions();
        let context = PermissionContext {
            requester_id: request.requester_id.clone(),
            correlation_id: correlation_id.clone(),
        };

        let init = AgentTurn::Init {
            mcp_server: self.gateway.server_name().to_string(),
            mcp_status: self.gateway.remote_status().to_string(),
            tools: tools.iter().map(|tool| tool.name.clone()).collect(),
        };
        info!(
            event_name = "agent.session.started",
            correlation_id = %correlation_id,
            mcp_status = self.gateway.remote_status(),
            tool_count = tools.len(),
            "agent session started"
        );
        sink.on_turn(&init).await;

        let mut messages = vec![Message::user(vec![ContentBlock::text(prompt)])];
        let mut tools_used = Vec::new();
        let mut last_text = String::new();

        for turn in 1..=self.settings.max_turns {
            let response = self
                .llm
                .complete(LlmRequest {
                    model: self.settings.model.clone(),
                    max_tokens: self.settings.max_tokens,
                    system: None,
                    messages: messages.clone(),
                    tools: tools.clone(),
                })
                .await?;

            let calls: Vec<ToolCall> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some(ToolCall { id: id.clone(), name: name.clone(), input: input.clone() })
                    }
                    _ => None,
                })
                .collect();
            let text = response.text();
            if !text.is_empty() {
                last_text = text.clone();
            }
            debug!(
                event_name = "agent.session.turn",
                correlation_id = %correlation_id,
                turn,
                tool_calls = calls.len(),
                stop_reason = ?response.stop_reason,
                "assistant turn"
            );
            // Calls from a reply cut short are never run, so they are not announced.
            let runnable = response.stop_reason == Some(StopReason::ToolUse);
            sink.on_turn(&AgentTurn::Assistant {
                text,
                tool_uses: calls
                    .iter()
                    .filter(|_| runnable)
                    .map(|call| ToolUseSummary { id: call.id.clone(), name: call.name.clone() })
                    .collect(),
            })
            .await;

            if calls.is_empty() {
                return Ok(self
                    .finish(sink, &correlation_id, ResultSubtype::Success, last_text, tools_used, turn)
                    .await);
            }
            if !runnable {
                warn!(
                    event_name = "agent.session.tool_use_incomplete",
                    correlation_id = %correlation_id,
                    turn,
                    skipped_calls = calls.len(),
                    stop_reason = ?response.stop_reason,
                    "reply stopped before its tool calls could run"
                );
                let subtype = ResultSubtype::ErrorIncompleteToolUse;
                return Ok(self
                    .finish(sink, &correlation_id, subtype, last_text, tools_used, turn)
                    .await);
            }

            messages.push(Message::assistant(
                response
                    .content
                    .into_iter()
                    .filter(|block| matches!(block, ContentBlock::Text { .. } | ContentBlock::ToolUse { .. }))
                    .collect(),
            ));

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let invocation = self.gateway.invoke(call, &context).await;
                if invocation.decision.is_allowed() {
                    tools_used.push(call.name.clone());
                }
                sink.on_turn(&AgentTurn::ToolResult {
                    tool_use_id: call.id.clone(),
                    tool_name: invocation.tool_name.clone(),
                    output: invocation.output.clone(),
                    is_error: invocation.is_error,
                })
                .await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: invocation.output,
                    is_error: invocation.is_error,
                });
            }
            messages.push(Message::user(results));
        }

        let turns = self.settings.max_turns;
        Ok(self
            .finish(sink, &correlation_id, ResultSubtype::ErrorMaxTurns, last_text, tools_used, turns)
            .await)
    }

    async fn finish(
        &self,
        sink: &dyn TurnSink,
        correlation_id: &str,
        subtype: ResultSubtype,
        result: String,
        tools_used: Vec<String>,
        turns: u32,
    ) -> SessionOutcome {
        info!(
            event_name = "agent.session.finished",
            correlation_id,
            subtype = subtype.as_str(),
            turns,
            tools_used = tools_used.len(),
            "agent session finished"
        );
        sink.on_turn(&AgentTurn::Result {
            subtype,
            result: result.clone(),
            tools_used: tools_used.clone(),
            turns,
        })
        .await;
        SessionOutcome { subtype, result, tools_used, turns }
    }
}
