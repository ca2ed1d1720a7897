//! Gateway integration tests
//!
//! End-to-end handshakes against in-process upstreams for every transport,
//! plus connection-service behavior across several upstreams.

mod connection;
mod stdio_transport;

use std::time::Duration;

use serde_json::Value;
use upmux_core::ConnectorConfig;
use upmux_gateway::pool::ConnectionService;

/// Mock stdio MCP server built from this package
pub const MOCK_STDIO_SERVER: &str = env!("CARGO_BIN_EXE_mock_stdio_server");

/// Connection service with a short fixed delay so retry tests stay fast
pub fn test_service(max_attempts: u32) -> ConnectionService {
    ConnectionService::new(&test_config(max_attempts))
}

pub fn test_config(max_attempts: u32) -> ConnectorConfig {
    ConnectorConfig::default()
        .with_retry(max_attempts, Duration::from_millis(20))
        .with_connect_timeout(Duration::from_secs(15))
}

/// Call a tool on the test upstream and return its first text content
pub async fn call_text_tool(
    peer: &rmcp::service::Peer<rmcp::RoleClient>,
    name: &str,
    arguments: Value,
) -> String {
    let params = serde_json::from_value(serde_json::json!({
        "name": name,
        "arguments": arguments,
    }))
    .expect("valid call params");
    let result = peer.call_tool(params).await.expect("tool call succeeds");
    let result = serde_json::to_value(&result).unwrap();
    result["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Names of the tools an upstream exposes, sorted
pub async fn tool_names(peer: &rmcp::service::Peer<rmcp::RoleClient>) -> Vec<String> {
    let mut names: Vec<String> = peer
        .list_all_tools()
        .await
        .expect("list tools")
        .into_iter()
        .map(|tool| tool.name.to_string())
        .collect();
    names.sort();
    names
}
