//! Building agents from a model configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::executor::{ToolAgent, DEFAULT_MAX_ITERATIONS};
use crate::agent::provider::Provider;
use crate::agent::AgentError;
use crate::llms::base_llm::ChatModel;
use crate::llms::providers::utils::resolve_api_key;
use crate::llms::providers::{AnthropicCompletion, GeminiCompletion, OllamaChat, OpenAICompletion};
use crate::tools::base_tool::Tool;

/// Which model an agent runs on.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("credential_set", &self.credential.is_some())
            .finish()
    }
}

impl ModelConfig {
    /// Build a config, filling a blank model with the provider default.
    pub fn new(provider: Provider, model: impl Into<String>, credential: Option<String>) -> Self {
        let model = model.into();
        let model = if model.trim().is_empty() {
            provider.default_model().to_string()
        } else {
            model.trim().to_string()
        };
        Self {
            provider,
            model,
            credential: credential.filter(|c| !c.trim().is_empty()),
        }
    }
}

/// Builds a move-proposing agent wired to exactly the given tools.
pub trait AgentFactory: Send + Sync + fmt::Debug {
    fn create_agent(
        &self,
        config: &ModelConfig,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<ToolAgent, AgentError>;
}

/// Factory backed by the real provider clients.
///
/// A credential comes from the player config first, then from the
/// factory's configured keys, then from the provider's environment variable.
#[derive(Clone)]
pub struct ProviderAgentFactory {
    pub ollama_base_url: Option<String>,
    pub max_iterations: usize,
    credentials: HashMap<Provider, String>,
}

impl fmt::Debug for ProviderAgentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAgentFactory")
            .field("ollama_base_url", &self.ollama_base_url)
            .field("max_iterations", &self.max_iterations)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ProviderAgentFactory {
    fn default() -> Self {
        Self::new(None, DEFAULT_MAX_ITERATIONS)
    }
}

impl ProviderAgentFactory {
    pub fn new(ollama_base_url: Option<String>, max_iterations: usize) -> Self {
        Self {
            ollama_base_url,
            max_iterations,
            credentials: HashMap::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: HashMap<Provider, String>) -> Self {
        self.credentials = credentials;
        self
    }

    fn credential(&self, config: &ModelConfig) -> Result<Option<String>, AgentError> {
        match config.provider.api_key_env() {
            None => Ok(None),
            Some(env_var) => config
                .credential
                .clone()
                .or_else(|| self.credentials.get(&config.provider).cloned())
                .and_then(|key| resolve_api_key(Some(key), env_var))
                .or_else(|| resolve_api_key(None, env_var))
                .map(Some)
                .ok_or_else(|| AgentError::MissingCredential {
                    provider: config.provider,
                    env_var: env_var.to_string(),
                }),
        }
    }

    fn build_model(&self, config: &ModelConfig) -> Result<Arc<dyn ChatModel>, AgentError> {
        let key = self.credential(config)?;
        let model: Arc<dyn ChatModel> = match config.provider {
            Provider::Anthropic => Arc::new(AnthropicCompletion::new(&config.model, key)),
            Provider::Mistral => Arc::new(OpenAICompletion::mistral(&config.model, key)),
            Provider::OpenAI => Arc::new(OpenAICompletion::new(&config.model, key)),
            Provider::Gemini => Arc::new(GeminiCompletion::new(&config.model, key)),
            Provider::Ollama => {
                let mut ollama = OllamaChat::new(&config.model, self.ollama_base_url.clone());
                log::info!(
                    "Using Ollama at {} model={} (think=false)",
                    ollama.base_url,
                    config.model
                );
                if let Err(e) = ollama.disable_thinking() {
                    log::warn!("Couldn't disable thinking for Ollama model: {}", e);
                }
                Arc::new(ollama)
            }
        };
        Ok(model)
    }
}

impl AgentFactory for ProviderAgentFactory {
    fn create_agent(
        &self,
        config: &ModelConfig,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<ToolAgent, AgentError> {
        log::info!(
            "Creating agent provider={} model={} tools={}",
            config.provider,
            config.model,
            tools.len()
        );
        let model = self.build_model(config)?;
        Ok(ToolAgent::new(model, tools).with_max_iterations(self.max_iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardHandle;
    use crate::tools::create_base_tools;

    #[test]
    fn test_model_config_fills_default_model() {
        let config = ModelConfig::new(Provider::Mistral, "  ", Some(String::new()));
        assert_eq!(config.model, "mistral-large-latest");
        assert!(config.credential.is_none());
        assert!(!format!("{:?}", ModelConfig::new(Provider::OpenAI, "", Some("sk-1".into())))
            .contains("sk-1"));
    }

    #[test]
    fn test_ollama_needs_no_credential() {
        let factory = ProviderAgentFactory::new(Some("http://127.0.0.1:1".into()), 7);
        let agent = factory
            .create_agent(
                &ModelConfig::new(Provider::Ollama, "", None),
                create_base_tools(BoardHandle::default(), None),
            )
            .unwrap();
        assert_eq!(agent.model().provider(), "ollama");
        assert_eq!(agent.model().model(), "qwen3");
        assert_eq!(agent.max_iterations, 7);
        assert_eq!(agent.tool_names().len(), 6);
    }

    #[test]
    fn test_configured_credential_is_used() {
        let mut keys = HashMap::new();
        keys.insert(Provider::Mistral, "from-settings".to_string());
        let factory = ProviderAgentFactory::default().with_credentials(keys);
        let config = ModelConfig::new(Provider::Mistral, "", None);
        assert_eq!(factory.credential(&config).unwrap().as_deref(), Some("from-settings"));

        let config = ModelConfig::new(Provider::Mistral, "", Some("from-ui".into()));
        assert_eq!(factory.credential(&config).unwrap().as_deref(), Some("from-ui"));
    }

    #[test]
    fn test_explicit_credential_builds_hosted_model() {
        let factory = ProviderAgentFactory::default();
        let agent = factory
            .create_agent(
                &ModelConfig::new(Provider::Anthropic, "", Some("test-key".into())),
                Vec::new(),
            )
            .unwrap();
        assert_eq!(agent.model().provider(), "anthropic");
        assert_eq!(agent.model().model(), "claude-sonnet-4-20250514");
    }
}
