//! Who controls each side.

use serde::{Deserialize, Serialize};

use crate::agent::{ModelConfig, Provider, UnsupportedProviderError};
use crate::board::Side;

/// Controller of one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "controller", rename_all = "lowercase")]
pub enum PlayerConfig {
    Human,
    Agent(ModelConfig),
}

impl PlayerConfig {
    /// Build from the three UI fields.
    ///
    /// `"Human"` (any case) selects a human; anything else must name a
    /// provider. A blank model falls back to the provider default.
    pub fn from_ui(
        provider: &str,
        model: &str,
        credential: &str,
    ) -> Result<Self, UnsupportedProviderError> {
        if provider.trim().eq_ignore_ascii_case("human") {
            return Ok(PlayerConfig::Human);
        }
        let provider: Provider = provider.parse()?;
        Ok(PlayerConfig::Agent(ModelConfig::new(
            provider,
            model,
            Some(credential.to_string()),
        )))
    }

    pub fn is_human(&self) -> bool {
        matches!(self, PlayerConfig::Human)
    }

    pub fn model_config(&self) -> Option<&ModelConfig> {
        match self {
            PlayerConfig::Human => None,
            PlayerConfig::Agent(config) => Some(config),
        }
    }
}

/// Both sides' configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub white: PlayerConfig,
    pub black: PlayerConfig,
}

impl Default for Players {
    /// Local model as White against a human Black.
    fn default() -> Self {
        Self {
            white: PlayerConfig::Agent(ModelConfig::new(Provider::Ollama, "", None)),
            black: PlayerConfig::Human,
        }
    }
}

impl Players {
    pub fn new(white: PlayerConfig, black: PlayerConfig) -> Self {
        Self { white, black }
    }

    pub fn humans() -> Self {
        Self::new(PlayerConfig::Human, PlayerConfig::Human)
    }

    pub fn for_side(&self, side: Side) -> &PlayerConfig {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ui() {
        assert_eq!(PlayerConfig::from_ui("Human", "x", "y").unwrap(), PlayerConfig::Human);
        assert!(PlayerConfig::from_ui(" human ", "", "").unwrap().is_human());

        let config = PlayerConfig::from_ui("OpenAI", "", "sk-test").unwrap();
        let model = config.model_config().unwrap();
        assert_eq!(model.provider, Provider::OpenAI);
        assert_eq!(model.model, "gpt-4o");
        assert_eq!(model.credential.as_deref(), Some("sk-test"));

        let config = PlayerConfig::from_ui("Ollama", "llama3.2", "").unwrap();
        assert_eq!(config.model_config().unwrap().model, "llama3.2");
        assert!(config.model_config().unwrap().credential.is_none());

        assert!(PlayerConfig::from_ui("Deep Blue", "", "").is_err());
    }

    #[test]
    fn test_players_by_side_and_serde() {
        let players = Players::default();
        assert!(!players.for_side(Side::White).is_human());
        assert!(players.for_side(Side::Black).is_human());

        let json = serde_json::to_value(&players).unwrap();
        assert_eq!(json["black"]["controller"], "human");
        assert_eq!(json["white"]["controller"], "agent");
        assert_eq!(json["white"]["provider"], "ollama");
        assert!(json["white"].get("credential").is_none());
    }
}
