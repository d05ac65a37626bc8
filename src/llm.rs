//! Chat-completion transport shared by the analyzer and the planner.
//!
//! Speaks the common `{model, messages, max_tokens, temperature}` contract
//! and extracts `choices[0].message.content`. The bearer token comes from the
//! environment variable named in config; a missing token means the cognitive
//! components run in their degraded fallback modes, it is never fatal.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::LlmSettings;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("api key environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("llm request failed: {0}")]
    Transport(String),
    #[error("llm request timed out")]
    Timeout,
    #[error("llm endpoint returned status {0}")]
    Status(u16),
    #[error("llm response was malformed: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Outermost `{...}` substring of a model reply, for the second parse stage
/// when the reply wraps its JSON in prose.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// HTTP client for one configured chat-completion endpoint.
pub struct ChatClient {
    settings: LlmSettings,
    api_key: String,
    http: reqwest::Client,
}

impl ChatClient {
    /// Build a client, reading the bearer token from the configured
    /// environment variable.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| LlmError::MissingApiKey(settings.api_key_env.clone()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            settings: settings.clone(),
            api_key,
            http,
        })
    }

    /// One round trip: system + user message in, assistant text out.
    pub async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.settings.model,
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
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        debug!("sending chat request to {}", self.settings.endpoint);
        let response = self
            .http
            .post(&self.settings.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("response had no choices".to_string()))
    }
}
