//! Generation port: prompt in, answer text out.
//!
//! Backends:
//! - **[`DisabledGenerator`]**: always unavailable.
//! - **[`OllamaGenerator`]**: `POST /api/generate` with `stream: false`.
//! - **[`OpenAIGenerator`]**: OpenAI-compatible `POST /v1/chat/completions`.
//!
//! One request per call, no streaming and no conversation state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::GenerationConfig;
use crate::embedding::openai_api_key;
use crate::port::{http_error, with_timeout, PortError};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// A black-box text generation capability.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, PortError>;
}

pub struct DisabledGenerator;

#[async_trait]
impl GenerationPort for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, PortError> {
        Err(PortError::Unavailable(
            "generation provider is disabled; set [generation] provider in the config".into(),
        ))
    }
}

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: Option<f32>,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        Ok(Self {
            model,
            url: base_url(config, DEFAULT_OLLAMA_URL),
            temperature: config.temperature,
            timeout: config.timeout(),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl GenerationPort for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PortError> {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = json!({ "temperature": t });
        }

        with_timeout(self.timeout, async {
            let response = self
                .client
                .post(format!("{}/api/generate", self.url))
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    PortError::Unavailable(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    ))
                })?;
            if !response.status().is_success() {
                return Err(http_error("Ollama", response).await);
            }
            let payload: Value = response.json().await.map_err(PortError::unavailable)?;
            parse_ollama_response(&payload)
        })
        .await
    }
}

fn parse_ollama_response(payload: &Value) -> Result<String, PortError> {
    payload["response"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PortError::Unavailable("invalid Ollama response: missing response".into()))
}

pub struct OpenAIGenerator {
    model: String,
    url: String,
    temperature: Option<f32>,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        Ok(Self {
            model,
            url: base_url(config, DEFAULT_OPENAI_URL),
            temperature: config.temperature,
            timeout: config.timeout(),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl GenerationPort for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PortError> {
        let api_key = openai_api_key()?;
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }

        with_timeout(self.timeout, async {
            let response = self
                .client
                .post(format!("{}/v1/chat/completions", self.url))
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await
                .map_err(PortError::unavailable)?;
            if !response.status().is_success() {
                return Err(http_error("OpenAI", response).await);
            }
            let payload: Value = response.json().await.map_err(PortError::unavailable)?;
            parse_chat_response(&payload)
        })
        .await
    }
}

fn parse_chat_response(payload: &Value) -> Result<String, PortError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            PortError::Unavailable("invalid chat response: missing choices[0].message.content".into())
        })
}

fn base_url(config: &GenerationConfig, default: &str) -> String {
    config
        .url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Build the configured [`GenerationPort`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationPort>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
