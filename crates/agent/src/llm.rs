use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use triage_core::config::{LlmConfig, LlmProvider};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 512;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completion client for the configured provider.
///
/// OpenAI and Ollama share the `/chat/completions` wire shape; Anthropic uses
/// `/messages` with its own headers.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    api_base: String,
    api_key: Option<SecretString>,
    model: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build llm http client")?;

        // base_url only applies to self-hosted endpoints.
        let api_base = match config.provider {
            LlmProvider::OpenAi => OPENAI_API_BASE.to_string(),
            LlmProvider::Anthropic => ANTHROPIC_API_BASE.to_string(),
            LlmProvider::Ollama => config
                .base_url
                .clone()
                .ok_or_else(|| anyhow!("llm.base_url is required for ollama"))?,
        };

        Ok(Self {
            client,
            provider: config.provider,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn complete_chat(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.context("llm request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("llm completion failed with {status}: {text}"));
        }

        let payload: Value = response.json().await.context("llm response was not json")?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("llm response had no message content"))
    }

    async fn complete_messages(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/messages", self.api_base);
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("anthropic provider requires llm.api_key"))?;
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("llm request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("llm completion failed with {status}: {text}"));
        }

        let payload: Value = response.json().await.context("llm response was not json")?;
        let text = payload["content"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(anyhow!("llm response had no text content"));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            event_name = "llm.request",
            provider = ?self.provider,
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending completion request"
        );
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => self.complete_chat(prompt).await,
            LlmProvider::Anthropic => self.complete_messages(prompt).await,
        }
    }
}
