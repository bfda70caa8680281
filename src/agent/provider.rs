//! Supported model providers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of model providers an agent can be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    Mistral,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    Ollama,
}

/// Provider string that names none of the supported providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported model provider: {0}")]
pub struct UnsupportedProviderError(pub String);

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Anthropic,
        Provider::Mistral,
        Provider::OpenAI,
        Provider::Gemini,
        Provider::Ollama,
    ];

    /// Display label used by UIs.
    pub fn label(self) -> &'static str {
        match self {
            Provider::Anthropic => "Anthropic",
            Provider::Mistral => "Mistral",
            Provider::OpenAI => "OpenAI",
            Provider::Gemini => "Gemini",
            Provider::Ollama => "Ollama",
        }
    }

    /// Model used when none is given.
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::Mistral => "mistral-large-latest",
            Provider::OpenAI => "gpt-4o",
            Provider::Gemini => "gemini-1.5-flash",
            Provider::Ollama => "qwen3",
        }
    }

    /// Environment variable holding the credential, if one is needed.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Mistral => Some("MISTRAL_API_KEY"),
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Provider {
    type Err = UnsupportedProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "mistral" | "mistralai" => Ok(Provider::Mistral),
            "openai" => Ok(Provider::OpenAI),
            "gemini" | "google" | "google_genai" => Ok(Provider::Gemini),
            "ollama" => Ok(Provider::Ollama),
            _ => Err(UnsupportedProviderError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels_and_aliases() {
        for provider in Provider::ALL {
            assert_eq!(provider.label().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("mistralai".parse::<Provider>().unwrap(), Provider::Mistral);
        assert_eq!(" Google_GenAI ".parse::<Provider>().unwrap(), Provider::Gemini);
    }

    #[test]
    fn test_unknown_provider() {
        let err = "Cohere".parse::<Provider>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported model provider: Cohere");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Provider::Ollama.api_key_env(), None);
        assert_eq!(Provider::Gemini.api_key_env(), Some("GEMINI_API_KEY"));
        assert_eq!(Provider::Anthropic.default_model(), "claude-sonnet-4-20250514");
        assert_eq!(serde_json::to_string(&Provider::OpenAI).unwrap(), "\"openai\"");
    }
}
