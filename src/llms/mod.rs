//! Language-model layer.
//!
//! - [`base_llm`] - the [`ChatModel`] trait and provider-neutral messages
//! - [`providers`] - provider clients (Anthropic, OpenAI, Mistral, Gemini, Ollama)

pub mod base_llm;
pub mod providers;

pub use base_llm::{
    ChatMessage, ChatModel, LlmError, MessageRole, ModelResponse, ToolCallRequest, ToolSpec,
};
