//! Chat model interface.
//!
//! Provides the [`ChatModel`] trait implemented by every provider client,
//! the provider-neutral message types it consumes, and [`LlmError`].
//!
//! Messages follow the OpenAI chat shape (system/user/assistant/tool roles,
//! assistant tool calls, tool results keyed by call id). Each provider
//! converts them to its own wire format.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the model layer.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport failure talking to the provider.
    #[error("{provider} request failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// The response body could not be understood.
    #[error("failed to parse {provider} response: {message}")]
    Decode { provider: String, message: String },

    /// No credential was configured for a provider that needs one.
    #[error("{provider} API key not set. Set {env_var} or pass an API key")]
    MissingCredential { provider: String, env_var: String },

    /// The model does not support a requested feature.
    #[error("{provider} does not support {feature}")]
    Unsupported { provider: String, feature: String },

    /// Every retry attempt failed.
    #[error("{provider} call failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        last_error: String,
    },
}

impl LlmError {
    pub fn decode(provider: &str, message: impl Into<String>) -> Self {
        LlmError::Decode {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// A tool invocation requested by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back with the tool result.
    pub id: String,
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// OpenAI `tool_calls[]` entry.
    pub fn to_openai(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.arguments.to_string(),
            }
        })
    }

    /// Parse an OpenAI `tool_calls[]` entry, whose arguments are a JSON string.
    pub fn from_openai(value: &Value) -> Option<Self> {
        let function = value.get("function")?;
        let name = function.get("name")?.as_str()?;
        let arguments = match function.get("arguments") {
            Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
            Some(other) => other.clone(),
            None => json!({}),
        };
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(new_call_id);
        Some(Self::new(id, name, arguments))
    }
}

/// Generate an id for providers that do not assign one.
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// One message in a model conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    /// Plain string or a list of content blocks.
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Call id answered by a `tool` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name answered by a `tool` message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Value::String(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Assistant turn as returned by a model, tool calls included.
    pub fn from_response(response: &ModelResponse) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: response.content.clone(),
            tool_calls: response.tool_calls.clone(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Result of one tool call.
    pub fn tool_result(call: &ToolCallRequest, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Value::String(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
        }
    }

    /// Concatenated text of the content, whatever its shape.
    pub fn text_content(&self) -> String {
        content_text(&self.content)
    }
}

/// Text carried by a content value: the string itself, or the joined
/// `text` fields of a block list.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tools and responses
// ---------------------------------------------------------------------------

/// Declaration of a callable tool advertised to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolSpec {
    /// OpenAI `tools[]` entry.
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One model answer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelResponse {
    /// Content in the provider's native shape: a string, or a list of
    /// content blocks, or null when the model only called tools.
    pub content: Value,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Value::String(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ChatModel trait
// ---------------------------------------------------------------------------

/// A chat model that supports native tool calling.
#[async_trait]
pub trait ChatModel: Send + Sync + fmt::Debug {
    /// Provider name, used in logs and errors.
    fn provider(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Send one request and return the assistant answer.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, LlmError>;

    /// Ask the model not to emit reasoning traces.
    fn disable_thinking(&mut self) -> Result<(), LlmError> {
        Err(LlmError::Unsupported {
            provider: self.provider().to_string(),
            feature: "disabling thinking".to_string(),
        })
    }
}
