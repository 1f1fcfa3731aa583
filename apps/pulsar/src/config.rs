//! # Configuration
//!
//! Optional `pulsar.toml` file, overridden by environment variables, in turn
//! overridden by CLI flags (applied by the caller).
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! expose_answer_keys = true
//!
//! [generator]
//! api_key = "gsk_..."
//! endpoint = "https://api.groq.com/openai/v1/chat/completions"
//! model = "llama-3.1-8b-instant"
//! timeout_secs = 5
//! ```

use pulsar_core::PulsarError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Placeholder key shipped in sample environments. Treated as unset.
pub const PLACEHOLDER_API_KEY: &str = "your_groq_api_key_here";

/// Default chat-completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Default generator timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// CONFIG STRUCTURE
// =============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulsarConfig {
    pub server: ServerConfig,
    pub generator: GeneratorConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Include `correct_index` in quiz payloads served to players.
    pub expose_answer_keys: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            expose_answer_keys: true,
        }
    }
}

/// Remote content generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GeneratorConfig {
    /// The key to use, if remote generation is enabled at all.
    pub fn effective_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != PLACEHOLDER_API_KEY)
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl PulsarConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, PulsarError> {
        toml::from_str(text)
            .map_err(|e| PulsarError::SerializationError(format!("Invalid config: {}", e)))
    }

    /// Load from `path` if it exists, otherwise defaults. Environment
    /// overrides are applied either way.
    pub fn load(path: &Path) -> Result<Self, PulsarError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| PulsarError::IoError(format!("Read config: {}", e)))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Self::from_toml(&text)?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// - `GROQ_API_KEY`: generator key
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.generator.api_key = Some(key);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PulsarConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.expose_answer_keys);
        assert_eq!(config.generator.model, DEFAULT_MODEL);
        assert_eq!(config.generator.timeout_secs, 5);
        assert!(config.generator.effective_key().is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = PulsarConfig::from_toml(
            r#"
            [server]
            port = 9000

            [generator]
            api_key = "gsk_test"
            "#,
        )
        .expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.generator.effective_key(), Some("gsk_test"));
        assert_eq!(config.generator.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn placeholder_key_disables_generator() {
        let mut config = GeneratorConfig {
            api_key: Some(PLACEHOLDER_API_KEY.to_string()),
            ..GeneratorConfig::default()
        };
        assert!(config.effective_key().is_none());
        config.api_key = Some("   ".to_string());
        assert!(config.effective_key().is_none());
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(matches!(
            PulsarConfig::from_toml("[server\nport = "),
            Err(PulsarError::SerializationError(_))
        ));
    }
}
