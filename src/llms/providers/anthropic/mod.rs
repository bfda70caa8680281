//! Anthropic Messages API client.
//!
//! System messages are lifted into the separate `system` parameter, tool
//! calls become `tool_use` blocks and tool results become `tool_result`
//! blocks inside a user turn.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llms::base_llm::{
    content_text, ChatMessage, ChatModel, LlmError, MessageRole, ModelResponse, ToolCallRequest,
    ToolSpec,
};
use crate::llms::providers::utils::{
    http_client, resolve_api_key, send_json_with_retry, RetryPolicy, DEFAULT_TIMEOUT,
};

const PROVIDER: &str = "anthropic";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Anthropic chat client.
#[derive(Debug, Clone)]
pub struct AnthropicCompletion {
    pub model: String,
    api_key: Option<String>,
    pub base_url: String,
    /// Maximum tokens in response (required by the API).
    pub max_tokens: u32,
    pub anthropic_version: String,
    pub temperature: Option<f64>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl AnthropicCompletion {
    /// Create a client; the key falls back to `ANTHROPIC_API_KEY`.
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: resolve_api_key(api_key, API_KEY_ENV),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            anthropic_version: "2023-06-01".to_string(),
            temperature: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Split out system text and convert the rest to Anthropic messages.
    fn format_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut formatted: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                MessageRole::System => system_parts.push(msg.text_content()),
                MessageRole::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.text_content(),
                    });
                    // Results of one assistant turn share a single user turn.
                    let previous = formatted
                        .last_mut()
                        .filter(|last| is_tool_result_turn(last))
                        .and_then(|last| last.get_mut("content"))
                        .and_then(Value::as_array_mut);
                    match previous {
                        Some(blocks) => blocks.push(block),
                        None => formatted.push(json!({ "role": "user", "content": [block] })),
                    }
                }
                MessageRole::Assistant if !msg.tool_calls.is_empty() => {
                    let mut blocks: Vec<Value> = Vec::new();
                    let text = msg.text_content();
                    if !text.is_empty() {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                    for call in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    formatted.push(json!({ "role": "assistant", "content": blocks }));
                }
                MessageRole::Assistant | MessageRole::User => {
                    formatted.push(json!({
                        "role": msg.role.as_str(),
                        "content": msg.text_content(),
                    }));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, formatted)
    }

    /// Build the request body for the Messages API.
    pub fn build_request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let (system, formatted) = Self::format_messages(messages);

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": formatted,
        });
        if let Some(system_text) = system {
            body["system"] = Value::String(system_text);
        }
        if let Some(temp) = self.temperature {
            body["temperature"] = json!(temp);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    /// Parse a Messages API response.
    ///
    /// A lone text block becomes plain string content; anything else keeps
    /// the block list (thinking blocks dropped).
    pub fn parse_response(response: &Value) -> Result<ModelResponse, LlmError> {
        if response.get("type").and_then(Value::as_str) == Some("error") {
            let message = response
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown Anthropic API error");
            return Err(LlmError::decode(PROVIDER, message));
        }

        let blocks = response
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::decode(PROVIDER, "no content array in response"))?;

        let mut kept: Vec<Value> = Vec::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

        for block in blocks {
            match block.get("type").and_then(Value::as_str).unwrap_or("") {
                "text" => kept.push(block.clone()),
                "tool_use" => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or("");
                    let name = block.get("name").and_then(Value::as_str).unwrap_or("");
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    tool_calls.push(ToolCallRequest::new(id, name, input));
                    kept.push(block.clone());
                }
                "thinking" => {
                    log::debug!("Anthropic thinking block skipped");
                }
                other => log::debug!("Unknown Anthropic content block type: {}", other),
            }
        }

        let content = if kept.is_empty() {
            Value::String(String::new())
        } else if kept.len() == 1 && tool_calls.is_empty() {
            Value::String(content_text(&kept[0]["text"]))
        } else {
            Value::Array(kept)
        };

        if let Some(usage) = response.get("usage") {
            log::debug!(
                "Anthropic token usage: input={}, output={}",
                usage.get("input_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("output_tokens").and_then(Value::as_i64).unwrap_or(0),
            );
        }

        Ok(ModelResponse {
            content,
            tool_calls,
        })
    }
}

fn is_tool_result_turn(message: &Value) -> bool {
    message["role"] == "user"
        && message["content"]
            .as_array()
            .map(|blocks| {
                !blocks.is_empty() && blocks.iter().all(|b| b["type"] == "tool_result")
            })
            .unwrap_or(false)
}

#[async_trait]
impl ChatModel for AnthropicCompletion {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, LlmError> {
        log::debug!(
            "AnthropicCompletion.complete: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            tools.len()
        );

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingCredential {
                provider: PROVIDER.to_string(),
                env_var: API_KEY_ENV.to_string(),
            })?;

        let body = self.build_request_body(messages, tools);
        let endpoint = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let client = http_client(PROVIDER, self.timeout)?;

        let response = send_json_with_retry(PROVIDER, self.retry, || {
            client
                .post(&endpoint)
                .header("content-type", "application/json")
                .header("x-api-key", api_key)
                .header("anthropic-version", &self.anthropic_version)
                .json(&body)
        })
        .await?;

        Self::parse_response(&response)
    }
}
