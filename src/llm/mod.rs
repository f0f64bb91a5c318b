//! LLM integration for the Convexa agent.
//!
//! The turn executor only sees the [`LlmProvider`] trait. The concrete
//! backend is Google Gemini, spoken to over HTTP by [`GeminiProvider`];
//! [`retry`] wraps single attempts with timeouts and backoff.

pub mod gemini;
pub mod provider;
pub(crate) mod retry;

pub use gemini::GeminiProvider;
pub use provider::*;
pub use retry::RetryPolicy;

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Read `GEMINI_API_KEY` (or `API_KEY`), `CONVEXA_MODEL` and
    /// `CONVEXA_GEMINI_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()))?;
        Ok(Self {
            backend: LlmBackend::Gemini,
            api_key: SecretString::from(api_key),
            model: std::env::var("CONVEXA_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            base_url: std::env::var("CONVEXA_GEMINI_BASE_URL")
                .unwrap_or_else(|_| gemini::DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => {
            let provider =
                GeminiProvider::new(config.api_key.clone(), &config.model, &config.base_url)?;
            tracing::info!("Using Gemini (model: {})", config.model);
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_keeps_model_name() {
        let config = LlmConfig {
            backend: LlmBackend::Gemini,
            api_key: SecretString::from("test-key"),
            model: "gemini-2.5-flash".to_string(),
            base_url: gemini::DEFAULT_BASE_URL.to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gemini-2.5-flash");
        assert_eq!(provider.name(), "gemini");
    }
}
