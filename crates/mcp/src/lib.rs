//! MCP (Model Context Protocol) client for the remote payment server.
//!
//! The payment service advertises its actions as MCP tools over the
//! streamable HTTP transport. This crate performs the handshake, caches the
//! advertised tools and forwards `tools/call` requests on behalf of the agent.
//!
//! ## Architecture
//!
//! - `HttpTransport`: JSON-RPC 2.0 over HTTP POST, accepting JSON or SSE bodies
//! - `McpClient`: `initialize` handshake, `tools/list` and `tools/call`
//! - `McpToolClient`: the seam the agent's tool gateway calls through
//!
//! ## Example Usage
//!
//! ```no_run
//! use payrelay_mcp::{HttpTransport, McpClient, McpToolClient};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), payrelay_mcp::McpError> {
//! let transport = HttpTransport::new(
//!     "https://mcp.paywithlocus.com/mcp",
//!     Some("locus-api-key".to_string().into()),
//!     Duration::from_secs(60),
//! )?;
//! let client = McpClient::connect("locus", transport).await?;
//! println!("{} tools available", client.tools().len());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod transport;
pub mod types;

pub use client::{McpClient, McpClientState, McpToolClient};
pub use error::McpError;
pub use transport::{HttpTransport, McpTransport};
pub use types::{McpToolDef, ToolContent, ToolsCallResult, PROTOCOL_VERSION};
