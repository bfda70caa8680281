//! Environment-driven settings.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PORT` | 8080 |
//! | `CHESSLM_MAX_MOVES` | 200 |
//! | `CHESSLM_MCP_URL` | unset (no remote tools) |
//! | `CHESSLM_MAX_AGENT_ITERATIONS` | 25 |
//! | `OLLAMA_BASE_URL` | `http://localhost:11434` |
//! | `ANTHROPIC_API_KEY`, `MISTRAL_API_KEY`, `OPENAI_API_KEY`, `GEMINI_API_KEY` | unset |
//!
//! Binaries call `dotenvy::dotenv()` first so a `.env` file can supply any
//! of these.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;

use crate::agent::{Provider, ProviderAgentFactory, DEFAULT_MAX_ITERATIONS};
use crate::orchestrator::DEFAULT_MAX_MOVES;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: String, value: String },
}

/// Process-wide settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub max_moves: usize,
    pub mcp_url: Option<String>,
    pub ollama_base_url: Option<String>,
    pub max_agent_iterations: usize,
    /// Provider credentials found in the environment.
    pub api_keys: HashMap<Provider, String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("port", &self.port)
            .field("max_moves", &self.max_moves)
            .field("mcp_url", &self.mcp_url)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("max_agent_iterations", &self.max_agent_iterations)
            .field("api_keys", &self.api_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_moves: DEFAULT_MAX_MOVES,
            mcp_url: None,
            ollama_base_url: None,
            max_agent_iterations: DEFAULT_MAX_ITERATIONS,
            api_keys: HashMap::new(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_keys = Provider::ALL
            .iter()
            .filter_map(|p| {
                let var = p.api_key_env()?;
                get(var).map(|key| (*p, key))
            })
            .collect();

        Ok(Self {
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            max_moves: parse_or("CHESSLM_MAX_MOVES", get("CHESSLM_MAX_MOVES"), DEFAULT_MAX_MOVES)?,
            mcp_url: get("CHESSLM_MCP_URL"),
            ollama_base_url: get("OLLAMA_BASE_URL"),
            max_agent_iterations: parse_or(
                "CHESSLM_MAX_AGENT_ITERATIONS",
                get("CHESSLM_MAX_AGENT_ITERATIONS"),
                DEFAULT_MAX_ITERATIONS,
            )?,
            api_keys,
        })
    }

    /// Agent factory configured from these settings.
    pub fn agent_factory(&self) -> ProviderAgentFactory {
        ProviderAgentFactory::new(self.ollama_base_url.clone(), self.max_agent_iterations)
            .with_credentials(self.api_keys.clone())
    }
}

fn parse_or<T: FromStr>(var: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            value: raw,
        }),
    }
}
