//! Streamable HTTP transport for MCP servers.
//!
//! Each JSON-RPC message is POSTed to the server URL. The server answers
//! with either a JSON body or a short `text/event-stream` body whose `data:`
//! lines carry the JSON-RPC response. The `mcp-session-id` header returned
//! by `initialize` is echoed on every later request.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context};
use parking_lot::Mutex;
use serde_json::Value;

/// Session header defined by the streamable HTTP transport.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP transport bound to one MCP endpoint.
#[derive(Debug)]
pub struct HttpTransport {
    /// Server URL (e.g. "https://example.com/gradio_api/mcp/").
    pub url: String,
    /// Extra HTTP headers sent with every request.
    pub headers: HashMap<String, String>,
    client: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building MCP HTTP client")?;
        Ok(Self {
            url: url.to_string(),
            headers: HashMap::new(),
            client,
            session_id: Mutex::new(None),
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Forget the current session.
    pub fn reset_session(&self) {
        *self.session_id.lock() = None;
    }

    /// POST one JSON-RPC message.
    ///
    /// Returns the response whose `id` matches `expect_id`, or `None` for
    /// notifications (which the server acknowledges with 202 and no body).
    pub async fn post(
        &self,
        message: &Value,
        expect_id: Option<u64>,
    ) -> anyhow::Result<Option<Value>> {
        let mut request = self
            .client
            .post(&self.url)
            .header("accept", "application/json, text/event-stream")
            .json(message);
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("MCP request to {} failed", self.url))?;

        let status = response.status();
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock() = Some(session.to_string());
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(anyhow!("authentication failed: HTTP {}", status));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!("MCP endpoint not found: {}", self.url));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("MCP server returned HTTP {}: {}", status, body));
        }

        let Some(expect_id) = expect_id else {
            return Ok(None);
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.context("reading MCP response body")?;

        decode_body(&content_type, &body, expect_id).map(Some)
    }
}

/// Decode a response body as JSON or as an event stream.
pub fn decode_body(content_type: &str, body: &str, expect_id: u64) -> anyhow::Result<Value> {
    if content_type.starts_with("text/event-stream") {
        return sse_events(body)
            .into_iter()
            .filter_map(|data| serde_json::from_str::<Value>(&data).ok())
            .find(|msg| msg.get("id").and_then(Value::as_u64) == Some(expect_id))
            .ok_or_else(|| anyhow!("no response with id {} in MCP event stream", expect_id));
    }

    let value: Value = serde_json::from_str(body).context("decoding MCP JSON response")?;
    match value {
        // Batched responses are allowed by JSON-RPC.
        Value::Array(items) => items
            .into_iter()
            .find(|msg| msg.get("id").and_then(Value::as_u64) == Some(expect_id))
            .ok_or_else(|| anyhow!("no response with id {} in MCP batch", expect_id)),
        single => Ok(single),
    }
}

/// Collect the `data:` payload of every event in an SSE body.
pub fn sse_events(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !current.is_empty() {
                events.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        events.push(current.join("\n"));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sse_events_split_and_join() {
        let body = "event: message\ndata: {\"a\":\ndata: 1}\n\n: comment\ndata: second\r\n\r\n";
        let events = sse_events(body);
        assert_eq!(events, vec!["{\"a\":\n1}".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_decode_event_stream_picks_matching_id() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n\n",
        );
        let value = decode_body("text/event-stream; charset=utf-8", body, 2).unwrap();
        assert_eq!(value["result"], json!({"tools": []}));
        assert!(decode_body("text/event-stream", body, 7).is_err());
    }

    #[test]
    fn test_decode_json_and_batch() {
        let value = decode_body("application/json", r#"{"id":1,"result":{}}"#, 1).unwrap();
        assert_eq!(value["id"], 1);

        let batch = r#"[{"id":4,"result":"a"},{"id":5,"result":"b"}]"#;
        assert_eq!(decode_body("application/json", batch, 5).unwrap()["result"], "b");
        assert!(decode_body("application/json", "not json", 1).is_err());
    }

    #[test]
    fn test_session_starts_empty() {
        let transport = HttpTransport::new("http://localhost:1/mcp", Duration::from_secs(1))
            .unwrap()
            .with_header("x-test", "1");
        assert!(transport.session_id().is_none());
        assert_eq!(transport.headers["x-test"], "1");
    }
}
