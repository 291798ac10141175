//! Agent runtime for payment requests.
//!
//! A session sends the rendered payment prompt to the LLM and loops over its
//! tool calls until it answers without one or runs out of turns:
//! 1. **LLM** (`llm`) - Anthropic Messages API with tool use
//! 2. **Permission policy** (`guardrails`) - allow the payment server's tools
//!    and the lookup tools, deny everything else
//! 3. **Tool gateway** (`gateway`) - route allowed calls to the local lookup
//!    tools (`tools`) or the remote MCP payment server
//! 4. **Turns** (`session`) - every init, assistant, tool result and final
//!    result is handed to a `TurnSink` as it happens
//!
//! `ocr` turns an uploaded receipt image into request text, and `runtime`
//! assembles all of the above from an `AppConfig`.
//!
//! Tools the policy does not allow are never executed. Denied calls go back
//! to the LLM as error results.

pub mod gateway;
pub mod guardrails;
pub mod llm;
pub mod ocr;
pub mod runtime;
pub mod session;
pub mod tools;

pub use gateway::{ToolCall, ToolGateway, ToolInvocation};
pub use guardrails::{PermissionContext, PermissionDecision, ToolPermissionPolicy};
pub use llm::{AnthropicClient, LlmClient, LlmError};
pub use ocr::{OcrError, ReceiptTextExtractor};
pub use runtime::{AgentRuntime, RuntimeError};
pub use session::{
    AgentSession, AgentTurn, ResultSubtype, SessionError, SessionOutcome, SessionSettings, TurnSink,
};
pub use tools::{ToolError, ToolRegistry};
