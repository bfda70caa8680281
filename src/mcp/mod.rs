//! Model Context Protocol integration.
//!
//! Connects to a remote MCP server over streamable HTTP and exposes its
//! tools to agents as [`McpTool`](crate::tools::McpTool)s.

pub mod client;
pub mod transport;

use std::sync::Arc;

pub use client::{McpClient, McpToolInfo};
pub use transport::HttpTransport;

use crate::tools::{McpTool, Tool};

/// Connect to `url` and wrap every tool it lists.
///
/// Callers treat an error as "no remote tools": the game still runs on the
/// local board tools alone.
pub async fn create_mcp_tools(url: &str) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
    let client = Arc::new(McpClient::new(url)?);
    client.connect().await?;
    let infos = client.list_tools().await?;

    let tools: Vec<Arc<dyn Tool>> = infos
        .into_iter()
        .map(|info| Arc::new(McpTool::new(Arc::clone(&client), info)) as Arc<dyn Tool>)
        .collect();

    log::info!(
        "Loaded {} MCP tools from {}: {:?}",
        tools.len(),
        url,
        tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>()
    );
    Ok(tools)
}
