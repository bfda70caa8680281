//! Provider clients.
//!
//! Each provider implements [`ChatModel`](crate::llms::base_llm::ChatModel)
//! and handles authentication, request formatting, tool calling and error
//! handling specific to that provider.
//!
//! | Provider | Module |
//! |----------|--------|
//! | Anthropic | [`anthropic`] |
//! | OpenAI, Mistral | [`openai`] |
//! | Gemini | [`gemini`] |
//! | Ollama | [`ollama`] |

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod utils;

pub use anthropic::AnthropicCompletion;
pub use gemini::GeminiCompletion;
pub use ollama::OllamaChat;
pub use openai::OpenAICompletion;
