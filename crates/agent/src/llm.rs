//! Anthropic Messages API client with tool use.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm api key is missing")]
    MissingApiKey,
    #[error("llm http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid llm response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self { kind: "base64".to_owned(), media_type: media_type.into(), data: data.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::User, content }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LlmRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

impl LlmResponse {
    /// All text blocks joined by blank lines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One request, no retries.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: &SecretString, base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = api_key.expose_secret().trim();
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|error| LlmError::InvalidResponse(format!("invalid API key header: {error}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let client = reqwest::Client::builder().default_headers(headers).timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    fn messages_url(&self) -> String {
        if self.base_url.ends_with("/messages") {
            return self.base_url.clone();
        }
        format!("{}/messages", self.base_url)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let response = self.client.post(self.messages_url()).json(&request).send().await?;
        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16(), body: raw });
        }
        serde_json::from_str(&raw).map_err(|error| LlmError::InvalidResponse(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Matcher;
    use serde_json::json;

    use super::{
        AnthropicClient, ContentBlock, LlmClient, LlmError, LlmRequest, Message, StopReason,
        ToolDefinition,
    };

    fn request() -> LlmRequest {
        LlmRequest {
            model: "claude-sonnet-4-5".to_owned(),
            max_tokens: 1024,
            system: None,
            messages: vec![Message::user(vec![ContentBlock::text("PAYMENT REQUEST $5 to bob")])],
            tools: vec![ToolDefinition {
                name: "get_wallet_id".to_owned(),
                description: "Look up a wallet".to_owned(),
                input_schema: json!({ "type": "object" }),
            }],
        }
    }

    #[test]
    fn serializes_tool_result_blocks() {
        let message = Message::user(vec![ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_owned(),
            content: "wallet-abc".to_owned(),
            is_error: false,
        }]);
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "tool_result");
        assert!(json["content"][0].get("is_error").is_none());
    }

    #[tokio::test]
    async fn sends_headers_and_parses_tool_use() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::PartialJson(json!({
                "model": "claude-sonnet-4-5",
                "tools": [{ "name": "get_wallet_id", "input_schema": { "type": "object" } }]
            })))
            .with_body(
                json!({
                    "id": "msg_1",
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "text", "text": "Looking up the wallet." },
                        { "type": "tool_use", "id": "toolu_1", "name": "get_wallet_id", "input": { "slack_user_id": "U1" } }
                    ],
                    "stop_reason": "tool_use"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = AnthropicClient::new(
            &"sk-ant-test".to_owned().into(),
            &format!("{}/v1", server.url()),
            Duration::from_secs(5),
        )
        .expect("client");
        let response = client.complete(request()).await.expect("complete");

        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.text(), "Looking up the wallet.");
        assert!(matches!(&response.content[1], ContentBlock::ToolUse { name, .. } if name == "get_wallet_id"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_reported_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .with_status(529)
            .with_body(r#"{"type":"error","error":{"type":"overloaded_error"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = AnthropicClient::new(
            &"sk-ant-test".to_owned().into(),
            &server.url(),
            Duration::from_secs(5),
        )
        .expect("client");
        let error = client.complete(request()).await.expect_err("status");

        assert!(matches!(error, LlmError::Status { status: 529, .. }));
        mock.assert_async().await;
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let result = AnthropicClient::new(
            &"  ".to_owned().into(),
            "https://api.anthropic.com/v1",
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn unknown_blocks_and_stop_reasons_are_tolerated() {
        let response: super::LlmResponse = serde_json::from_value(json!({
            "content": [{ "type": "thinking", "thinking": "..." }, { "type": "text", "text": "done" }],
            "stop_reason": "pause_turn"
        }))
        .expect("parse");
        assert_eq!(response.content[0], ContentBlock::Unknown);
        assert_eq!(response.stop_reason, Some(StopReason::Other));
        assert_eq!(response.text(), "done");
    }
}
