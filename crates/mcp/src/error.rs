use thiserror::Error;

use crate::client::McpClientState;

/// Errors raised while talking to a remote MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("http request for `{method}` failed: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server rejected `{method}` with status {status}")]
    Status { method: String, status: u16 },

    #[error("server rejected credentials for `{method}`")]
    Unauthorized { method: String },

    #[error("`{method}` returned JSON-RPC error {code}: {message}")]
    Rpc { method: String, code: i64, message: String },

    #[error("invalid response for `{method}`: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("MCP client for `{server}` is not ready (state: {state:?})")]
    NotReady { server: String, state: McpClientState },

    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl McpError {
    /// True when retrying with a new session could not help.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
