//! Tools served by a remote MCP server.
//!
//! Every [`McpTool`] shares one connected [`McpClient`]; calls go through the
//! client's retry loop and the result content is flattened to text.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::mcp::client::{McpClient, McpToolInfo};
use crate::tools::base_tool::{render, Tool, ToolError, ToolErrorKind, ToolResult};

/// A remote tool exposed to agents under its server-side name.
#[derive(Clone)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub args_schema: Value,
    client: Arc<McpClient>,
}

impl fmt::Debug for McpTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpTool")
            .field("name", &self.name)
            .field("server", &self.client.url())
            .finish()
    }
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, info: McpToolInfo) -> Self {
        let description = info
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Tool {} from {}", info.name, client.url()));
        Self {
            name: info.name,
            description,
            args_schema: info.input_schema,
            client,
        }
    }

    /// Call the remote tool, keeping failures structured.
    pub async fn invoke(&self, args: HashMap<String, Value>) -> ToolResult {
        let result = self
            .client
            .call_tool(&self.name, &args)
            .await
            .map_err(|e| ToolError::new(ToolErrorKind::Remote, &self.name, e.to_string()))?;

        let text = extract_result_content(&result);
        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ToolError::new(ToolErrorKind::Remote, &self.name, text));
        }
        Ok(text)
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        self.args_schema.clone()
    }

    async fn run(&self, args: HashMap<String, Value>) -> String {
        render(self.invoke(args).await)
    }
}

/// Flatten a `tools/call` result to text.
///
/// Text content items are joined with newlines; other items are rendered as
/// JSON.
pub fn extract_result_content(result: &Value) -> String {
    if let Some(s) = result.as_str() {
        return s.to_string();
    }

    if let Some(content) = result.get("content") {
        if let Some(items) = content.as_array() {
            return items
                .iter()
                .map(|item| match item.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => item.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n");
        }
        return content.to_string();
    }

    if let Some(structured) = result.get("structuredContent") {
        return structured.to_string();
    }

    result.to_string()
}
