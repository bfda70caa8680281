//! MCP client for remote tool servers.
//!
//! This module provides [`McpClient`], which speaks JSON-RPC 2.0 to a
//! Model Context Protocol server: `initialize`, `tools/list` and
//! `tools/call`. Operations are retried with exponential backoff unless the
//! failure is an authentication or not-found error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mcp::transport::HttpTransport;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// MCP connection timeout in seconds.
pub const MCP_CONNECTION_TIMEOUT: u64 = 30;
/// MCP tool execution timeout in seconds.
pub const MCP_TOOL_EXECUTION_TIMEOUT: u64 = 30;
/// Maximum attempts per operation.
pub const MCP_MAX_RETRIES: u32 = 3;
/// Protocol revision sent in `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

// ---------------------------------------------------------------------------
// Tool descriptions
// ---------------------------------------------------------------------------

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

// ---------------------------------------------------------------------------
// McpClient
// ---------------------------------------------------------------------------

/// MCP client bound to one server.
///
/// # Example
///
/// ```rust,no_run
/// use chesslm::mcp::McpClient;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let client = McpClient::new("http://localhost:7860/gradio_api/mcp/")?.with_max_retries(2);
/// client.connect().await?;
/// let tools = client.list_tools().await?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct McpClient {
    transport: HttpTransport,
    /// Tool execution timeout in seconds.
    pub execution_timeout: u64,
    /// Maximum attempts per operation.
    pub max_retries: u32,
    next_id: AtomicU64,
    initialized: AtomicBool,
}

impl McpClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(url, Duration::from_secs(MCP_CONNECTION_TIMEOUT))?;
        Ok(Self::with_transport(transport))
    }

    pub fn with_transport(transport: HttpTransport) -> Self {
        Self {
            transport,
            execution_timeout: MCP_TOOL_EXECUTION_TIMEOUT,
            max_retries: MCP_MAX_RETRIES,
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
        }
    }

    // -----------------------------------------------------------------------
    // Builder methods
    // -----------------------------------------------------------------------

    /// Builder: set execution timeout.
    pub fn with_execution_timeout(mut self, timeout: u64) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Builder: set max attempts (at least one).
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.transport.url
    }

    pub fn connected(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Protocol operations
    // -----------------------------------------------------------------------

    /// Run the `initialize` handshake.
    pub async fn connect(&self) -> anyhow::Result<()> {
        if self.connected() {
            return Ok(());
        }
        log::info!("Connecting to MCP server at {}", self.url());

        let result = self
            .retry_operation(|| {
                self.request(
                    "initialize",
                    json!({
                        "protocolVersion": MCP_PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {
                            "name": env!("CARGO_PKG_NAME"),
                            "version": env!("CARGO_PKG_VERSION"),
                        }
                    }),
                )
            })
            .await
            .map_err(|e| {
                log::error!("MCP connection to {} failed: {}", self.url(), e);
                e
            })?;

        self.notify("notifications/initialized", json!({})).await?;
        self.initialized.store(true, Ordering::SeqCst);

        let server = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        log::info!(
            "Connected to MCP server {} (session={:?})",
            server,
            self.transport.session_id()
        );
        Ok(())
    }

    /// Forget the session so the next `connect` re-initializes.
    pub fn disconnect(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.transport.reset_session();
        log::info!("Disconnected from MCP server at {}", self.url());
    }

    /// List every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> anyhow::Result<Vec<McpToolInfo>> {
        self.ensure_connected()?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self
                .retry_operation(|| self.request("tools/list", params.clone()))
                .await?;
            let page: Vec<McpToolInfo> =
                serde_json::from_value(result.get("tools").cloned().unwrap_or(json!([])))?;
            tools.extend(page);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        log::debug!("MCP server {} listed {} tools", self.url(), tools.len());
        Ok(tools)
    }

    /// Call a tool and return the raw `tools/call` result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &HashMap<String, Value>,
    ) -> anyhow::Result<Value> {
        self.ensure_connected()?;
        let cleaned = Self::clean_tool_arguments(arguments);
        log::info!("Calling MCP tool {} with {:?}", name, cleaned);

        let params = json!({ "name": name, "arguments": cleaned });
        let result = self
            .retry_operation(|| self.request("tools/call", params.clone()))
            .await;

        match &result {
            Ok(_) => log::info!("MCP tool {} completed", name),
            Err(e) => log::error!("MCP tool {} failed: {}", name, e),
        }
        result
    }

    /// Drop null arguments, recursively.
    ///
    /// Models often send explicit nulls for optional parameters, which strict
    /// servers reject.
    pub fn clean_tool_arguments(
        arguments: &HashMap<String, Value>,
    ) -> serde_json::Map<String, Value> {
        arguments
            .iter()
            .filter_map(|(key, value)| clean_value(value).map(|v| (key.clone(), v)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // JSON-RPC plumbing
    // -----------------------------------------------------------------------

    fn ensure_connected(&self) -> anyhow::Result<()> {
        if !self.connected() {
            bail!("Client not connected. Call connect() first.");
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .transport
            .post(&message, Some(id))
            .await?
            .ok_or_else(|| anyhow!("empty response to {}", method))?;
        rpc_result(response)
    }

    async fn notify(&self, method: &str, params: Value) -> anyhow::Result<()> {
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.transport.post(&message, None).await?;
        Ok(())
    }

    /// Retry an operation with exponential backoff (1s, 2s, 4s, ...).
    ///
    /// Authentication and not-found errors are returned immediately.
    async fn retry_operation<F, Fut, T>(&self, operation: F) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let mut last_error = None;
        let timeout = Duration::from_secs(self.execution_timeout);

        for attempt in 0..self.max_retries {
            match tokio::time::timeout(timeout, operation()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    if is_non_retryable(&e) {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
                Err(_) => {
                    last_error = Some(anyhow!(
                        "Operation timed out after {} seconds",
                        self.execution_timeout
                    ));
                }
            }

            if attempt + 1 < self.max_retries {
                let wait_time = Duration::from_secs(2u64.pow(attempt));
                log::warn!("MCP operation failed, retrying in {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Operation failed after {} attempts", self.max_retries)))
    }
}

fn is_non_retryable(error: &anyhow::Error) -> bool {
    let text = error.to_string().to_lowercase();
    text.contains("authentication")
        || text.contains("unauthorized")
        || text.contains("not found")
        || text.contains("mcp error")
}

/// Unwrap a JSON-RPC response into its `result`.
fn rpc_result(response: Value) -> anyhow::Result<Value> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("MCP error {}: {}", code, message);
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| anyhow!("JSON-RPC response without result"))
}

fn clean_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: serde_json::Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| clean_value(v).map(|v| (k.clone(), v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.iter().filter_map(clean_value).collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Array(cleaned))
            }
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tool_arguments_removes_nulls() {
        let mut args = HashMap::new();
        args.insert("fen".to_string(), json!("8/8/8/8/8/8/8/8 w - - 0 1"));
        args.insert("depth".to_string(), Value::Null);
        args.insert("opts".to_string(), json!({"a": null, "b": 1}));
        args.insert("empty".to_string(), json!({"a": null}));
        args.insert("list".to_string(), json!([null, "x"]));

        let cleaned = McpClient::clean_tool_arguments(&args);
        assert_eq!(cleaned.len(), 3);
        assert!(!cleaned.contains_key("depth"));
        assert!(!cleaned.contains_key("empty"));
        assert_eq!(cleaned["opts"], json!({"b": 1}));
        assert_eq!(cleaned["list"], json!(["x"]));
    }

    #[test]
    fn test_rpc_result_and_error() {
        assert_eq!(rpc_result(json!({"id": 1, "result": {"ok": true}})).unwrap()["ok"], true);
        let failure = json!({"id": 1, "error": {"code": -32601, "message": "Method not found"}});
        let err = rpc_result(failure).unwrap_err();
        assert_eq!(err.to_string(), "MCP error -32601: Method not found");
        assert!(is_non_retryable(&err));
        assert!(!is_non_retryable(&anyhow!("connection reset")));
    }

    #[test]
    fn test_tool_info_defaults_schema() {
        let info: McpToolInfo = serde_json::from_value(json!({"name": "analyze"})).unwrap();
        assert_eq!(info.input_schema["type"], "object");
        assert!(info.description.is_none());
    }

    #[test]
    fn test_client_builder() {
        let client = McpClient::new("http://localhost:1/mcp")
            .unwrap()
            .with_execution_timeout(5)
            .with_max_retries(0);
        assert_eq!(client.execution_timeout, 5);
        assert_eq!(client.max_retries, 1);
        assert!(!client.connected());
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let client = McpClient::new("http://localhost:1/mcp").unwrap();
        assert!(client.list_tools().await.is_err());
        assert!(client.call_tool("x", &HashMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_retry_operation_stops_on_non_retryable() {
        let client = McpClient::new("http://localhost:1/mcp").unwrap();
        let calls = AtomicU64::new(0);
        let result: anyhow::Result<()> = client
            .retry_operation(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("authentication failed"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
