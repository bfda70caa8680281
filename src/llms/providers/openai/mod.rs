//! OpenAI Chat Completions client.
//!
//! Also serves Mistral, whose chat completions endpoint speaks the same
//! protocol at its own base URL.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llms::base_llm::{
    ChatMessage, ChatModel, LlmError, MessageRole, ModelResponse, ToolCallRequest, ToolSpec,
};
use crate::llms::providers::utils::{
    http_client, resolve_api_key, send_json_with_retry, RetryPolicy, DEFAULT_TIMEOUT,
};

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the Mistral API key.
pub const MISTRAL_API_KEY_ENV: &str = "MISTRAL_API_KEY";

/// Chat Completions client for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAICompletion {
    provider: &'static str,
    api_key_env: &'static str,
    pub model: String,
    api_key: Option<String>,
    pub base_url: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl OpenAICompletion {
    /// OpenAI client; the key falls back to `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            provider: "openai",
            api_key_env: OPENAI_API_KEY_ENV,
            model: model.into(),
            api_key: resolve_api_key(api_key, OPENAI_API_KEY_ENV),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: None,
            max_tokens: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Mistral client; the key falls back to `MISTRAL_API_KEY`.
    pub fn mistral(model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            provider: "mistral",
            api_key_env: MISTRAL_API_KEY_ENV,
            api_key: resolve_api_key(api_key, MISTRAL_API_KEY_ENV),
            base_url: "https://api.mistral.ai/v1".to_string(),
            ..Self::new(model, None)
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn format_message(msg: &ChatMessage) -> Value {
        match msg.role {
            MessageRole::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                "content": msg.text_content(),
            }),
            MessageRole::Assistant if !msg.tool_calls.is_empty() => {
                let text = msg.text_content();
                let tool_calls: Vec<Value> =
                    msg.tool_calls.iter().map(ToolCallRequest::to_openai).collect();
                json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                    "tool_calls": tool_calls,
                })
            }
            role => json!({
                "role": role.as_str(),
                "content": msg.text_content(),
            }),
        }
    }

    /// Build the request body for the Chat Completions API.
    pub fn build_request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(Self::format_message).collect::<Vec<_>>(),
        });
        if let Some(temp) = self.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_openai).collect());
            body["tool_choice"] = json!("auto");
        }
        body
    }

    /// Parse a Chat Completions response.
    pub fn parse_response(provider: &str, response: &Value) -> Result<ModelResponse, LlmError> {
        let message = response
            .pointer("/choices/0/message")
            .ok_or_else(|| LlmError::decode(provider, "no choices[0].message in response"))?;

        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| calls.iter().filter_map(ToolCallRequest::from_openai).collect())
            .unwrap_or_default();

        if let Some(usage) = response.get("usage") {
            log::debug!(
                "{} token usage: prompt={}, completion={}, total={}",
                provider,
                usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("total_tokens").and_then(Value::as_i64).unwrap_or(0),
            );
        }

        Ok(ModelResponse {
            content: message.get("content").cloned().unwrap_or(Value::Null),
            tool_calls,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAICompletion {
    fn provider(&self) -> &str {
        self.provider
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
            "OpenAICompletion.complete: provider={}, model={}, messages={}, tools={}",
            self.provider,
            self.model,
            messages.len(),
            tools.len()
        );

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingCredential {
                provider: self.provider.to_string(),
                env_var: self.api_key_env.to_string(),
            })?;

        let body = self.build_request_body(messages, tools);
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let client = http_client(self.provider, self.timeout)?;

        let response = send_json_with_retry(self.provider, self.retry, || {
            client.post(&endpoint).bearer_auth(api_key).json(&body)
        })
        .await?;

        Self::parse_response(self.provider, &response)
    }
}
