//! MCP client: protocol handshake and tool calls against a single remote server.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::McpError;
use crate::transport::McpTransport;
use crate::types::{
    Implementation, InitializeParams, InitializeResult, McpToolDef, ToolsCallParams,
    ToolsCallResult, ToolsListResult, PROTOCOL_VERSION,
};

/// State of an MCP client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpClientState {
    /// Transport created, handshake not finished.
    Connected,
    /// `initialize` completed and tools listed.
    Ready,
    /// Handshake or tool listing failed.
    Failed,
    Closed,
}

impl McpClientState {
    /// Status label reported to the agent session on init.
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Connected => "pending",
            Self::Ready => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

/// What the tool gateway needs from a remote MCP server.
#[async_trait]
pub trait McpToolClient: Send + Sync {
    fn server_name(&self) -> &str;

    fn state(&self) -> McpClientState;

    /// Tools advertised during connect.
    fn tools(&self) -> &[McpToolDef];

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult, McpError>;
}

pub struct McpClient {
    server_name: String,
    transport: Arc<dyn McpTransport>,
    state: McpClientState,
    server_info: Option<InitializeResult>,
    tools: Vec<McpToolDef>,
}

impl McpClient {
    /// Performs the handshake (`initialize` + `notifications/initialized`) and lists tools.
    pub async fn connect<T>(server_name: &str, transport: T) -> Result<Self, McpError>
    where
        T: McpTransport + 'static,
    {
        Self::connect_shared(server_name, Arc::new(transport)).await
    }

    pub async fn connect_shared(
        server_name: &str,
        transport: Arc<dyn McpTransport>,
    ) -> Result<Self, McpError> {
        info!(server = %server_name, "connecting to MCP server");
        let mut client = Self {
            server_name: server_name.to_owned(),
            transport,
            state: McpClientState::Connected,
            server_info: None,
            tools: Vec::new(),
        };

        if let Err(error) = client.initialize().await {
            warn!(server = %server_name, error = %error, "MCP initialize handshake failed");
            client.state = McpClientState::Failed;
            return Err(error);
        }
        if let Err(error) = client.list_tools().await {
            warn!(server = %server_name, error = %error, "MCP tools/list failed");
            client.state = McpClientState::Failed;
            return Err(error);
        }
        client.state = McpClientState::Ready;
        Ok(client)
    }

    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    pub async fn shutdown(&mut self) {
        self.state = McpClientState::Closed;
        self.transport.close().await;
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: serde_json::json!({}),
            client_info: Implementation {
                name: "payrelay".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            },
        };

        let response =
            self.transport.request("initialize", Some(serde_json::to_value(&params)?)).await?;
        let result: InitializeResult = serde_json::from_value(response.result.ok_or_else(|| {
            McpError::InvalidResponse {
                method: "initialize".to_owned(),
                reason: "missing result".to_owned(),
            }
        })?)?;

        info!(
            server = %self.server_name,
            protocol = %result.protocol_version,
            remote_name = %result.server_info.name,
            "MCP server initialized"
        );
        self.server_info = Some(result);

        self.transport.notify("notifications/initialized", None).await
    }

    async fn list_tools(&mut self) -> Result<(), McpError> {
        let mut cursor: Option<String> = None;
        let mut tools = Vec::new();

        loop {
            let params = cursor.as_ref().map(|cursor| serde_json::json!({ "cursor": cursor }));
            let response = self.transport.request("tools/list", params).await?;
            let page: ToolsListResult =
                serde_json::from_value(response.result.ok_or_else(|| {
                    McpError::InvalidResponse {
                        method: "tools/list".to_owned(),
                        reason: "missing result".to_owned(),
                    }
                })?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!(server = %self.server_name, count = tools.len(), "fetched MCP tools");
        self.tools = tools;
        Ok(())
    }
}

#[async_trait]
impl McpToolClient for McpClient {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn state(&self) -> McpClientState {
        self.state
    }

    fn tools(&self) -> &[McpToolDef] {
        &self.tools
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult, McpError> {
        if self.state != McpClientState::Ready {
            return Err(McpError::NotReady {
                server: self.server_name.clone(),
                state: self.state,
            });
        }

        let params = ToolsCallParams { name: name.to_owned(), arguments };
        let response =
            self.transport.request("tools/call", Some(serde_json::to_value(&params)?)).await?;
        let result = serde_json::from_value(response.result.ok_or_else(|| {
            McpError::InvalidResponse {
                method: "tools/call".to_owned(),
                reason: "missing result".to_owned(),
            }
        })?)?;
        Ok(result)
    }
}
