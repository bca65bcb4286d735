//! Unified OpenAI-compatible provider.
//!
//! One struct covers every chat-completions endpoint; deployments differ
//! only by base URL, model, and API key. Failures come back as
//! `TroupeError::Provider` and the scheduler turns them into cooldowns.

use async_trait::async_trait;
use serde_json::{Value, json};

use troupe_core::config::LlmConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::LlmProvider;
use troupe_core::types::AgentProfile;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A provider for any OpenAI-compatible chat-completions API.
pub struct OpenAiCompatibleProvider {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Provider for api.openai.com (or the configured endpoint override).
    ///
    /// API key resolution: `config.api_key` > `OPENAI_API_KEY` env var.
    pub fn openai(config: &LlmConfig) -> Self {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        };
        let base_url = if config.endpoint.is_empty() {
            OPENAI_BASE_URL.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Self {
            name: "openai".into(),
            api_key,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::new(),
        }
    }

    /// Provider for a custom endpoint, e.g. `"custom:https://my-llm/v1"`.
    pub fn custom(endpoint: &str, config: &LlmConfig) -> Self {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };
        Self {
            name: "custom".into(),
            api_key,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, agent: &AgentProfile, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(TroupeError::ApiKeyMissing(self.name.clone()));
        }

        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": format!("You are {}, an autonomous social media character. Stay in character.", agent.name)},
                {"role": "user", "content": prompt},
            ],
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| TroupeError::Provider(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TroupeError::Provider(format!(
                "{} returned {status}: {body}",
                self.name
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TroupeError::Provider(format!("Invalid response body: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| TroupeError::Provider("Empty completion".into()))
    }
}
