//! Google Gemini `generateContent` client.
//!
//! Gemini uses `contents` with `parts` instead of `messages` with `content`,
//! the role `model` for the assistant, and `functionCall` /
//! `functionResponse` parts for tool use.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llms::base_llm::{
    new_call_id, ChatMessage, ChatModel, LlmError, MessageRole, ModelResponse, ToolCallRequest,
    ToolSpec,
};
use crate::llms::providers::utils::{
    http_client, resolve_api_key, send_json_with_retry, RetryPolicy, DEFAULT_TIMEOUT,
};

const PROVIDER: &str = "gemini";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Gemini chat client.
#[derive(Debug, Clone)]
pub struct GeminiCompletion {
    pub model: String,
    api_key: Option<String>,
    pub base_url: String,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl GeminiCompletion {
    /// Create a client; the key falls back to `GEMINI_API_KEY`, then
    /// `GOOGLE_API_KEY`.
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        let api_key = resolve_api_key(api_key, API_KEY_ENV)
            .or_else(|| resolve_api_key(None, "GOOGLE_API_KEY"));
        Self {
            model: model.into(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: None,
            max_output_tokens: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Generation config, omitted fields left to the API defaults.
    pub fn generation_config(&self) -> Value {
        let mut config = serde_json::Map::new();
        if let Some(temp) = self.temperature {
            config.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tokens) = self.max_output_tokens {
            config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        Value::Object(config)
    }

    fn format_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                MessageRole::System => system_parts.push(msg.text_content()),
                MessageRole::Tool => {
                    let part = json!({
                        "functionResponse": {
                            "name": msg.name.clone().unwrap_or_default(),
                            "response": { "result": msg.text_content() }
                        }
                    });
                    let previous = contents
                        .last_mut()
                        .filter(|last| is_function_response_turn(last))
                        .and_then(|last| last.get_mut("parts"))
                        .and_then(Value::as_array_mut);
                    match previous {
                        Some(parts) => parts.push(part),
                        None => contents.push(json!({ "role": "user", "parts": [part] })),
                    }
                }
                MessageRole::Assistant => {
                    let mut parts: Vec<Value> = Vec::new();
                    let text = msg.text_content();
                    if !text.is_empty() {
                        parts.push(json!({ "text": text }));
                    }
                    for call in &msg.tool_calls {
                        parts.push(json!({
                            "functionCall": { "name": call.name, "args": call.arguments }
                        }));
                    }
                    if parts.is_empty() {
                        parts.push(json!({ "text": "" }));
                    }
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
                MessageRole::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{ "text": msg.text_content() }],
                    }));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, contents)
    }

    /// Build the complete request body.
    pub fn build_request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let (system, contents) = Self::format_messages(messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": self.generation_config(),
        });
        if let Some(system_text) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system_text }] });
        }
        if !tools.is_empty() {
            let declarations: Vec<Value> = tools.iter().map(function_declaration).collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }
        body
    }

    /// Parse a `generateContent` response.
    pub fn parse_response(response: &Value) -> Result<ModelResponse, LlmError> {
        let parts = response
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::decode(PROVIDER, "no candidates[0].content.parts"))?;

        let mut text_parts: Vec<&str> = Vec::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                text_parts.push(text);
            }
            if let Some(fc) = part.get("functionCall") {
                let name = fc.get("name").and_then(Value::as_str).unwrap_or("");
                let args = fc.get("args").cloned().unwrap_or_else(|| json!({}));
                tool_calls.push(ToolCallRequest::new(new_call_id(), name, args));
            }
        }

        if let Some(usage) = response.get("usageMetadata") {
            log::debug!(
                "Gemini token usage: prompt={}, candidates={}",
                usage.get("promptTokenCount").and_then(Value::as_i64).unwrap_or(0),
                usage.get("candidatesTokenCount").and_then(Value::as_i64).unwrap_or(0),
            );
        }

        Ok(ModelResponse {
            content: Value::String(text_parts.join("")),
            tool_calls,
        })
    }
}

/// Gemini rejects object schemas without properties, so argument-less
/// tools are declared without `parameters`.
fn function_declaration(tool: &ToolSpec) -> Value {
    let mut declaration = json!({
        "name": tool.name,
        "description": tool.description,
    });
    let has_properties = tool
        .parameters
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| !props.is_empty())
        .unwrap_or(false);
    if has_properties {
        declaration["parameters"] = tool.parameters.clone();
    }
    declaration
}

fn is_function_response_turn(content: &Value) -> bool {
    content["role"] == "user"
        && content["parts"]
            .as_array()
            .map(|parts| {
                !parts.is_empty() && parts.iter().all(|p| p.get("functionResponse").is_some())
            })
            .unwrap_or(false)
}

#[async_trait]
impl ChatModel for GeminiCompletion {
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
            "GeminiCompletion.complete: model={}, messages={}, tools={}",
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
        let endpoint = self.endpoint();
        let client = http_client(PROVIDER, self.timeout)?;

        let response = send_json_with_retry(PROVIDER, self.retry, || {
            client
                .post(&endpoint)
                .header("x-goog-api-key", api_key)
                .json(&body)
        })
        .await?;

        Self::parse_response(&response)
    }
}
