//! Chat-completions client for OpenAI-compatible endpoints.

use crate::config::LlmConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Blocking chat client.
///
/// Used from the async engine via `spawn_blocking`; one preprocessing call
/// per request keeps the bridge cheap.
pub struct ChatClient {
    api_key: Option<String>,
    endpoint: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl ChatClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    /// Builds a client from configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout_ms) = config.timeout_ms.filter(|ms| *ms > 0) {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(connect_ms) = config.connect_timeout_ms.filter(|ms| *ms > 0) {
            builder = builder.connect_timeout(Duration::from_millis(connect_ms));
        }
        let client = builder.build().unwrap_or_else(|err| {
            tracing::warn!("Failed to build LLM HTTP client: {err}");
            reqwest::blocking::Client::new()
        });

        Self {
            api_key: config.api_key.clone(),
            endpoint: config
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_ENDPOINT.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            client,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Generates a completion for a system + user prompt pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is unconfigured, the request fails,
    /// or the response has no choices.
    pub fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::OperationFailed {
                operation: "llm_request".to_string(),
                cause: "API key not configured".to_string(),
            })?;

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: 1024,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| Error::OperationFailed {
                operation: "llm_request".to_string(),
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::OperationFailed {
                operation: "llm_request".to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        let response: ChatCompletionResponse =
            response.json().map_err(|e| Error::OperationFailed {
                operation: "llm_response".to_string(),
                cause: e.to_string(),
            })?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::OperationFailed {
                operation: "llm_response".to_string(),
                cause: "no choices in response".to_string(),
            })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_client_errors() {
        let client = ChatClient::from_config(&LlmConfig::default());
        let result = client.complete("system", "user");
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let client = ChatClient::from_config(&LlmConfig::default())
            .with_api_key("k")
            .with_model("local-model");
        assert_eq!(client.model, "local-model");
        assert!(client.api_key.is_some());
    }
}
