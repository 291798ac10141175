//! Slack Web API calls the relay needs: identity, Socket Mode URLs, posting,
//! channel history and private file downloads.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::blocks::MessageTemplate;
use crate::events::{MessageEvent, SlackFile};

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("slack http request `{method}` failed: {source}")]
    Http { method: &'static str, source: reqwest::Error },
    #[error("slack `{method}` returned status {status}")]
    Status { method: &'static str, status: u16 },
    #[error("slack `{method}` failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack `{method}` response missing `{field}`")]
    MissingField { method: &'static str, field: &'static str },
}

#[async_trait]
pub trait MessagePoster: Send + Sync {
    /// Posts into `thread_ts` when given and returns the new message's ts.
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<String, SlackApiError>;
}

#[async_trait]
pub trait FileDownloader: Send + Sync {
    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError>;
}

#[derive(Debug, Deserialize)]
struct SlackEnvelopeResponse {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    body: Value,
}

#[derive(Debug, Deserialize)]
struct AuthTestBody {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenSocketBody {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    text: Option<String>,
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    files: Vec<SlackFile>,
}

#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    api_base: String,
    app_token: SecretString,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(
        api_base: &str,
        app_token: SecretString,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("payrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| SlackApiError::Http { method: "client.build", source })?;

        Ok(Self { http, api_base: api_base.trim_end_matches('/').to_owned(), app_token, bot_token })
    }

    /// Returns the bot's own user id.
    pub async fn auth_test(&self) -> Result<String, SlackApiError> {
        let method = "auth.test";
        let body: AuthTestBody = self
            .call(method, self.http.post(self.url(method)).bearer_auth(self.bot_token.expose_secret()))
            .await?;
        body.user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or(SlackApiError::MissingField { method, field: "user_id" })
    }

    pub async fn open_socket_url(&self) -> Result<String, SlackApiError> {
        let method = "apps.connections.open";
        let body: OpenSocketBody = self
            .call(method, self.http.post(self.url(method)).bearer_auth(self.app_token.expose_secret()))
            .await?;
        body.url
            .filter(|value| !value.trim().is_empty())
            .ok_or(SlackApiError::MissingField { method, field: "url" })
    }

    /// Most recent messages first, as Slack returns them.
    pub async fn conversations_history(
        &self,
        channel: &str,
        limit: u32,
    ) -> Result<Vec<MessageEvent>, SlackApiError> {
        let method = "conversations.history";
        let limit = limit.to_string();
        let request = self
            .http
            .get(self.url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("channel", channel), ("limit", limit.as_str())]);
        let body: HistoryBody = self.call(method, request).await?;

        Ok(body
            .messages
            .into_iter()
            .map(|message| MessageEvent {
                channel_id: channel.to_owned(),
                channel_type: None,
                user_id: message.user,
                bot_id: message.bot_id,
                subtype: message.subtype,
                text: message.text.unwrap_or_default(),
                ts: message.ts,
                thread_ts: message.thread_ts,
                files: message.files,
            })
            .collect())
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SlackApiError> {
        let response =
            request.send().await.map_err(|source| SlackApiError::Http { method, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlackApiError::Status { method, status: status.as_u16() });
        }

        let envelope: SlackEnvelopeResponse =
            response.json().await.map_err(|source| SlackApiError::Http { method, source })?;
        if !envelope.ok {
            return Err(SlackApiError::Api {
                method,
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_owned()),
            });
        }

        serde_json::from_value(envelope.body)
            .map_err(|error| SlackApiError::Api { method, error: error.to_string() })
    }
}

#[async_trait]
impl MessagePoster for SlackWebClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<String, SlackApiError> {
        let method = "chat.postMessage";
        let mut payload = json!({
            "channel": channel,
            "text": message.fallback_text,
            "blocks": message.blocks,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_owned());
        }

        let request = self
            .http
            .post(self.url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&payload);
        let body: PostMessageBody = self.call(method, request).await?;
        body.ts.ok_or(SlackApiError::MissingField { method, field: "ts" })
    }
}

#[async_trait]
impl FileDownloader for SlackWebClient {
    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError> {
        let method = "files.download";
        let response = self
            .http
            .get(url)
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(|source| SlackApiError::Http { method, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlackApiError::Status { method, status: status.as_u16() });
        }
        let bytes =
            response.bytes().await.map_err(|source| SlackApiError::Http { method, source })?;
        Ok(bytes.to_vec())
    }
}
