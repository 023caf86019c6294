//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{Result, TripSqlError};
use crate::llm::{
    anthropic, openai, AnthropicClient, AnthropicConfig, LlmClient, LlmProvider, MockLlmClient,
    OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client for the configured provider.
///
/// API keys come from `OPENAI_API_KEY` or `ANTHROPIC_API_KEY`. The model is
/// `config.model` when set, otherwise the provider default.
pub fn create_client(config: &LlmConfig, timeout_secs: u64) -> Result<Arc<dyn LlmClient>> {
    create_client_with(config, timeout_secs, |key| std::env::var(key).ok())
}

fn create_client_with<F>(
    config: &LlmConfig,
    timeout_secs: u64,
    var: F,
) -> Result<Arc<dyn LlmClient>>
where
    F: Fn(&str) -> Option<String>,
{
    match config.provider {
        LlmProvider::OpenAi => {
            let key = var("OPENAI_API_KEY").ok_or_else(|| {
                TripSqlError::config("No API key configured. Set OPENAI_API_KEY.")
            })?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
            let client =
                OpenAiClient::new(OpenAiConfig::new(key, model).with_timeout(timeout_secs))?;
            Ok(Arc::new(client))
        }
        LlmProvider::Anthropic => {
            let key = var("ANTHROPIC_API_KEY").ok_or_else(|| {
                TripSqlError::config("No API key configured. Set ANTHROPIC_API_KEY.")
            })?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string());
            let client =
                AnthropicClient::new(AnthropicConfig::new(key, model).with_timeout(timeout_secs))?;
            Ok(Arc::new(client))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm_config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_create_mock_client() {
        let client = create_client_with(&llm_config(LlmProvider::Mock), 30, |_| None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_create_openai_without_key_fails() {
        let result = create_client_with(&llm_config(LlmProvider::OpenAi), 30, |_| None);
        let err = result.err().unwrap();
        assert!(err.to_string().contains("No API key configured"));
    }

    #[test]
    fn test_create_openai_with_key() {
        let result = create_client_with(&llm_config(LlmProvider::OpenAi), 30, |key| {
            (key == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_create_anthropic_without_key_fails() {
        let result = create_client_with(&llm_config(LlmProvider::Anthropic), 30, |_| None);
        let err = result.err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_create_anthropic_with_key() {
        let result = create_client_with(&llm_config(LlmProvider::Anthropic), 30, |key| {
            (key == "ANTHROPIC_API_KEY").then(|| "sk-ant-test".to_string())
        });
        assert!(result.is_ok());
    }
}
