//! Streamable HTTP transport: one POST per JSON-RPC message. Responses come
//! back either as plain JSON or as a short `text/event-stream` body.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::McpError;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};

const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const STREAMABLE_ACCEPT_HEADER: &str = "application/json, text/event-stream";

#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Sends a request and returns its successful response.
    async fn request(&self, method: &str, params: Option<Value>)
        -> Result<JsonRpcResponse, McpError>;

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// Ends the server-side session, if any.
    async fn close(&self);
}

pub struct HttpTransport {
    client: Client,
    url: String,
    api_key: Option<SecretString>,
    next_id: AtomicU64,
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(
        url: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = Client::builder().timeout(timeout).build().map_err(McpError::Client)?;
        Ok(Self {
            client,
            url: url.to_owned(),
            api_key,
            next_id: AtomicU64::new(1),
            session_id: RwLock::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn build_post(&self) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, STREAMABLE_ACCEPT_HEADER)
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);

        if let Some(session_id) = self.session_id.read().await.clone() {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        request
    }

    async fn send(
        &self,
        method: &str,
        body: &impl serde::Serialize,
    ) -> Result<reqwest::Response, McpError> {
        let response = self
            .build_post()
            .await
            .json(body)
            .send()
            .await
            .map_err(|source| McpError::Http { method: method.to_owned(), source })?;

        self.store_session_id(&response).await;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(McpError::Unauthorized { method: method.to_owned() })
            }
            status if !status.is_success() => {
                Err(McpError::Status { method: method.to_owned(), status: status.as_u16() })
            }
            _ => Ok(response),
        }
    }

    async fn store_session_id(&self, response: &reqwest::Response) {
        let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
        else {
            return;
        };

        let mut slot = self.session_id.write().await;
        if slot.as_deref() != Some(session_id) {
            debug!(url = %self.url, session_id, "updated MCP session id");
            *slot = Some(session_id.to_owned());
        }
    }
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|content_type| content_type.split(';').next())
        .is_some_and(|base| base.trim() == "text/event-stream")
}

/// Returns the response to request `id` from an event stream. Servers may send
/// notifications and progress messages on the same stream first; those are skipped.
pub(crate) fn parse_event_stream(
    body: &str,
    method: &str,
    id: &Value,
) -> Result<JsonRpcResponse, McpError> {
    let mut data = String::new();

    for line in body.lines() {
        let trimmed = line.trim_end();
        if let Some(rest) = trimmed.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
            continue;
        }

        if trimmed.is_empty() && !data.is_empty() {
            if let Some(response) = response_for(&data, id) {
                return Ok(response);
            }
            data.clear();
        }
    }

    if let Some(response) = response_for(&data, id) {
        return Ok(response);
    }

    Err(McpError::InvalidResponse {
        method: method.to_owned(),
        reason: format!("event stream carried no JSON-RPC response for id {id}"),
    })
}

fn response_for(data: &str, id: &Value) -> Option<JsonRpcResponse> {
    let frame = serde_json::from_str::<Value>(data).ok()?;
    if frame.get("method").is_some() || frame.get("id") != Some(id) {
        return None;
    }
    if frame.get("result").is_none() && frame.get("error").is_none() {
        return None;
    }
    serde_json::from_value(frame).ok()
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let request_id = request.id.clone();
        debug!(method, id, "sending MCP request");

        let response = self.send(method, &request).await?;
        let streamed = is_event_stream(&response);
        let body = response
            .text()
            .await
            .map_err(|source| McpError::Http { method: method.to_owned(), source })?;

        let rpc = if streamed {
            parse_event_stream(&body, method, &request_id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body).map_err(|error| {
                McpError::InvalidResponse { method: method.to_owned(), reason: error.to_string() }
            })?
        };

        if let Some(error) = rpc.error {
            return Err(McpError::Rpc {
                method: method.to_owned(),
                code: error.code,
                message: error.message,
            });
        }
        Ok(rpc)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        self.send(method, &notification).await.map(drop)
    }

    async fn close(&self) {
        let Some(session_id) = self.session_id.write().await.take() else {
            return;
        };
        let mut request = self.client.delete(&self.url).header(MCP_SESSION_ID_HEADER, session_id);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        if let Err(error) = request.send().await {
            debug!(url = %self.url, error = %error, "MCP session close failed");
        }
    }
}
