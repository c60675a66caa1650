//! OpenAI-compatible chat completions client.
//!
//! Talks to any endpoint exposing `/chat/completions` (OpenAI itself, or a
//! local server such as Ollama via `base_url`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{AskError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;
use crate::retry::RetryPolicy;

/// Maximum number of HTTP attempts for transient errors.
const MAX_TRANSPORT_ATTEMPTS: u32 = 3;

/// Base delay for transport retries.
const TRANSPORT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for transport retry delays.
const TRANSPORT_MAX_DELAY: Duration = Duration::from_millis(8000);

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "gpt-3.5-turbo", "gpt-4o").
    pub model: String,
    /// Sampling temperature; 0 keeps SQL generation deterministic.
    pub temperature: f32,
    /// API base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Request timeout in seconds (0 disables the timeout).
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: defaults.temperature,
            base_url: defaults.base_url,
            timeout_secs: defaults.timeout_secs,
        }
    }

    /// Builds a config from the `[llm]` section and an API key.
    pub fn from_llm_config(api_key: impl Into<String>, config: &LlmConfig) -> Self {
        Self {
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// OpenAI LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
    retry: RetryPolicy,
}

impl OpenAiClient {
    /// Creates a new OpenAI client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| AskError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            retry: RetryPolicy::Exponential {
                base: TRANSPORT_BASE_DELAY,
                max: TRANSPORT_MAX_DELAY,
            },
        })
    }

    /// Overrides the delay policy between transport retries.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Converts internal messages to OpenAI API format.
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: reqwest::StatusCode, body: &str) -> (AskError, bool) {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                AskError::llm("Authentication failed. Check your OPENAI_API_KEY."),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (AskError::llm("Rate limited. Please wait and try again."), true);
        }

        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return (
                AskError::llm(format!("OpenAI API error: {}", error_response.error.message)),
                is_retryable,
            );
        }

        (
            AskError::llm(format!("OpenAI API error ({}): {}", status, body)),
            is_retryable,
        )
    }

    fn request_error(error: &reqwest::Error) -> (AskError, bool) {
        if error.is_timeout() {
            (AskError::llm("Request timed out. Try again."), true)
        } else if error.is_connect() {
            (
                AskError::llm("Failed to connect to the completion API. Check your network."),
                true,
            )
        } else {
            (AskError::llm(format!("Request failed: {}", error)), false)
        }
    }

    /// Extracts the completion text from a successful response body.
    fn parse_completion(body: &str) -> Result<String> {
        let response: OpenAiResponse = serde_json::from_str(body)
            .map_err(|e| AskError::llm(format!("Failed to parse response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AskError::llm("Empty response from completion API"))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            temperature: self.config.temperature,
            stream: false,
        };
        let url = self.config.completions_url();

        let mut attempt = 1;
        loop {
            debug!(
                "Completion request attempt {} of {}",
                attempt, MAX_TRANSPORT_ATTEMPTS
            );

            let result = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            let (error, is_retryable) = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| AskError::llm(format!("Failed to read response: {}", e)))?;

                    if status.is_success() {
                        return Self::parse_completion(&body);
                    }
                    Self::parse_error(status, &body)
                }
                Err(e) => Self::request_error(&e),
            };

            if !is_retryable || attempt >= MAX_TRANSPORT_ATTEMPTS {
                return Err(error);
            }

            warn!(
                "Completion request failed (attempt {}), retrying: {}",
                attempt, error
            );
            self.retry.wait(attempt).await;
            attempt += 1;
        }
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
