//! OpenAI chat completions provider

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::generation::SYSTEM_PROMPT;

use super::llm::{GenerationConfig, LlmProvider};
use super::retry::retry_with_backoff;

/// OpenAI-compatible chat completions client
pub struct OpenAiLlm {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiLlm {
    /// Build the client; fails when no API key is configured
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::GenerationUnavailable("OpenAI API key not configured".into()))?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.openai_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn complete_once(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let request = ChatRequest {
            model: &config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation(format!("Completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("Failed to parse completion: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::generation("Completion contained no text"))
    }
}

fn map_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::GenerationUnavailable("Invalid OpenAI API key".into()),
        StatusCode::TOO_MANY_REQUESTS if body.contains("insufficient_quota") => {
            Error::GenerationUnavailable("OpenAI quota exceeded".into())
        }
        StatusCode::TOO_MANY_REQUESTS => Error::generation("OpenAI rate limit reached"),
        _ => Error::generation(format!("Completion failed: HTTP {} - {}", status, body)),
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlm {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        tracing::info!("Generating answer with model: {}", config.model);
        retry_with_backoff(self.max_retries, Duration::from_secs(1), || {
            self.complete_once(prompt, config)
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_unavailable() {
        let config = LlmConfig::default();
        assert!(matches!(
            OpenAiLlm::new(&config),
            Err(Error::GenerationUnavailable(_))
        ));

        let blank = LlmConfig {
            api_key: Some("  ".into()),
            ..LlmConfig::default()
        };
        assert!(OpenAiLlm::new(&blank).is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            Error::GenerationUnavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, r#"{"error":{"code":"insufficient_quota"}}"#),
            Error::GenerationUnavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Error::GenerationError(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "upstream"),
            Error::GenerationError(_)
        ));
    }

    #[test]
    fn test_client_built_with_key() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            openai_url: "http://localhost:9/v1/".into(),
            ..LlmConfig::default()
        };
        let llm = OpenAiLlm::new(&config).unwrap();
        assert_eq!(llm.base_url, "http://localhost:9/v1");
        assert_eq!(llm.name(), "openai");
    }
}
