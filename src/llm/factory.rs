//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use crate::config::LlmConfig;
use crate::error::{AskError, Result};
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};

/// Creates an LLM client from the `[llm]` config section.
///
/// If `api_key` is provided, it takes precedence over `OPENAI_API_KEY`.
/// Endpoints other than the official API (a local Ollama server, for
/// instance) may not need a key at all; an empty one is sent in that case.
pub fn create_client(config: &LlmConfig, api_key: Option<String>) -> Result<Box<dyn LlmClient>> {
    match config.provider()? {
        LlmProvider::OpenAi => {
            let key = api_key
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .filter(|k| !k.trim().is_empty());
            let key = match key {
                Some(key) => key,
                None if config.base_url.contains("api.openai.com") => {
                    return Err(AskError::llm(
                        "No API key configured. Set OPENAI_API_KEY or use --llm mock.",
                    ))
                }
                None => String::new(),
            };
            Ok(Box::new(OpenAiClient::new(OpenAiConfig::from_llm_config(
                key, config,
            ))?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
