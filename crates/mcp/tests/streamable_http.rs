//! End-to-end handshake and tool call against a mocked streamable HTTP server.

use std::time::Duration;

use mockito::Matcher;
use payrelay_mcp::{HttpTransport, McpClient, McpClientState, McpToolClient, ToolContent};
use serde_json::json;

fn sse(body: serde_json::Value) -> String {
    format!("event: message\ndata: {body}\n\n")
}

#[tokio::test]
async fn connects_lists_and_calls_tools_over_http() {
    let mut server = mockito::Server::new_async().await;

    let initialize = server
        .mock("POST", "/mcp")
        .match_header("authorization", "Bearer locus-test-key")
        .match_body(Matcher::PartialJson(json!({ "method": "initialize" })))
        .with_header("content-type", "application/json")
        .with_header("mcp-session-id", "session-1")
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "locus-mcp" }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let initialized = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", "session-1")
        .match_body(Matcher::PartialJson(json!({ "method": "notifications/initialized" })))
        .with_status(202)
        .create_async()
        .await;

    let list = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", "session-1")
        .match_body(Matcher::PartialJson(json!({ "method": "tools/list" })))
        .with_header("content-type", "text/event-stream")
        .with_body(sse(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {
                "tools": [{
                    "name": "send_to_address",
                    "description": "Send USDC to a wallet address",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "address": { "type": "string" }, "amount": { "type": "number" } }
                    }
                }]
            }
        })))
        .create_async()
        .await;

    let call = server
        .mock("POST", "/mcp")
        .match_body(Matcher::PartialJson(json!({
            "method": "tools/call",
            "params": { "name": "send_to_address", "arguments": { "address": "0xabc", "amount": 45 } }
        })))
        .with_header("content-type", "text/event-stream")
        .with_body(sse(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "result": { "content": [{ "type": "text", "text": "Sent 45 USDC to 0xabc" }] }
        })))
        .create_async()
        .await;

    let transport = HttpTransport::new(
        &format!("{}/mcp", server.url()),
        Some("locus-test-key".to_owned().into()),
        Duration::from_secs(5),
    )
    .expect("transport");
    let client = McpClient::connect("locus", transport).await.expect("connect");

    assert_eq!(client.state(), McpClientState::Ready);
    assert_eq!(client.tools().len(), 1);
    assert_eq!(client.tools()[0].name, "send_to_address");

    let result = client
        .call_tool("send_to_address", json!({ "address": "0xabc", "amount": 45 }))
        .await
        .expect("call");
    assert!(!result.is_error);
    assert_eq!(
        result.content,
        vec![ToolContent::Text { text: "Sent 45 USDC to 0xabc".to_owned() }]
    );

    initialize.assert_async().await;
    initialized.assert_async().await;
    list.assert_async().await;
    call.assert_async().await;
}

#[tokio::test]
async fn server_errors_fail_the_connection() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/mcp").with_status(503).create_async().await;

    let transport =
        HttpTransport::new(&format!("{}/mcp", server.url()), None, Duration::from_secs(5))
            .expect("transport");
    let error = McpClient::connect("locus", transport).await.err().expect("connect should fail");

    assert!(error.to_string().contains("503"));
}
