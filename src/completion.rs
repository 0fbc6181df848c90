//! Chat completion providers used to compose answers.
//!
//! - **[`OpenAIChat`]** — any OpenAI-compatible `/chat/completions` endpoint (OpenAI, Mistral, ...).
//! - **[`OllamaChat`]** — a local Ollama instance's `/api/chat` endpoint.
//! - **[`DisabledChat`]** — returns errors; `ask` then fails with a clear message.
//!
//! Use [`create_chat_model`] to build the one named by `chat.provider`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::http::{api_key_from_env, endpoint, JsonClient};

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::provider(
            "chat provider is disabled; set [chat] provider and model to answer questions",
        ))
    }
}

pub struct OpenAIChat {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    client: JsonClient,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("chat.model required for OpenAI provider".into()))?;
        let api_key =
            api_key_from_env(config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY"))?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            temperature: config.temperature,
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let json = self
            .client
            .post_json(&endpoint(&self.url, "chat/completions"), Some(&self.api_key), &body)
            .await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::provider("invalid OpenAI response: missing message content"))
    }
}

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: f32,
    client: JsonClient,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("chat.model required for Ollama provider".into()))?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": {"temperature": self.temperature},
            "messages": [{"role": "user", "content": prompt}],
        });
        let json = self
            .client
            .post_json(&endpoint(&self.url, "api/chat"), None, &body)
            .await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::provider("invalid Ollama response: missing message content"))
    }
}

pub fn create_chat_model(config: &ChatConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledChat)),
        other => Err(Error::Config(format!("unknown chat provider: {}", other))),
    }
}
