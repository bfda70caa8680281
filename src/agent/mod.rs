//! Agents that play moves through tools.
//!
//! - [`provider`] - the closed set of model providers
//! - [`factory`] - building a [`ToolAgent`] from a [`ModelConfig`]
//! - [`executor`] - the tool-calling loop as a lazy event stream
//! - [`bridge`] - folding that stream into transcript snapshots

pub mod bridge;
pub mod executor;
pub mod factory;
pub mod provider;

pub use bridge::{extract_answer_text, invoke, to_chat_messages};
pub use executor::{AgentEvent, ToolAgent, DEFAULT_MAX_ITERATIONS};
pub use factory::{AgentFactory, ModelConfig, ProviderAgentFactory};
pub use provider::{Provider, UnsupportedProviderError};

use thiserror::Error;

use crate::llms::base_llm::LlmError;

/// Errors raised while building or running an agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    UnsupportedProvider(#[from] UnsupportedProviderError),

    #[error("{provider} API key not set. Set {env_var} or enter a key")]
    MissingCredential { provider: Provider, env_var: String },

    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("Agent stopped after reaching the limit of {0} model calls")]
    MaxIterations(usize),
}
