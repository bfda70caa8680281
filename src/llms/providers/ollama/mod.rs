//! Ollama `/api/chat` client for locally hosted models.
//!
//! No credential is needed. Reasoning traces can be switched off with the
//! request-level `think` flag.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llms::base_llm::{
    new_call_id, ChatMessage, ChatModel, LlmError, MessageRole, ModelResponse, ToolCallRequest,
    ToolSpec,
};
use crate::llms::providers::utils::{http_client, send_json_with_retry, RetryPolicy};

const PROVIDER: &str = "ollama";

/// Default local endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local models can be slow to load; allow more time than hosted APIs.
const OLLAMA_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(default, skip_serializing)]
    thinking: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

/// Ollama chat client.
#[derive(Debug, Clone)]
pub struct OllamaChat {
    pub model: String,
    pub base_url: String,
    /// `Some(false)` asks the model to skip its reasoning trace.
    pub think: Option<bool>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl OllamaChat {
    pub fn new(model: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            think: None,
            timeout: OLLAMA_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    fn format_message(msg: &ChatMessage) -> OllamaMessage {
        OllamaMessage {
            role: msg.role.as_str().to_string(),
            content: msg.text_content(),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| OllamaToolCall {
                    function: OllamaFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_name: match msg.role {
                MessageRole::Tool => msg.name.clone(),
                _ => None,
            },
            thinking: None,
        }
    }

    /// Build the request body for `/api/chat`.
    pub fn build_request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: messages.iter().map(Self::format_message).collect(),
            tools: tools.iter().map(ToolSpec::to_openai).collect(),
            stream: false,
            think: self.think,
        };
        serde_json::to_value(&request).unwrap_or_else(|_| json!({}))
    }

    /// Parse a non-streaming `/api/chat` response.
    pub fn parse_response(response: Value) -> Result<ModelResponse, LlmError> {
        let parsed: OllamaChatResponse = serde_json::from_value(response)
            .map_err(|e| LlmError::decode(PROVIDER, e.to_string()))?;
        let message = parsed.message;

        if let Some(thinking) = message.thinking.as_deref().filter(|t| !t.is_empty()) {
            log::debug!("Ollama thinking trace ({} chars) skipped", thinking.len());
        }

        let tool_calls = message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = match call.function.arguments {
                    Value::Null => json!({}),
                    Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                    other => other,
                };
                ToolCallRequest::new(new_call_id(), call.function.name, arguments)
            })
            .collect();

        Ok(ModelResponse {
            content: Value::String(message.content),
            tool_calls,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
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
            "OllamaChat.complete: model={}, messages={}, tools={}, think={:?}",
            self.model,
            messages.len(),
            tools.len(),
            self.think
        );

        let body = self.build_request_body(messages, tools);
        let endpoint = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let client = http_client(PROVIDER, self.timeout)?;

        let response =
            send_json_with_retry(PROVIDER, self.retry, || client.post(&endpoint).json(&body))
                .await?;

        Self::parse_response(response)
    }

    fn disable_thinking(&mut self) -> Result<(), LlmError> {
        self.think = Some(false);
        Ok(())
    }
}
