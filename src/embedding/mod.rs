//! Embedding port: text in, fixed-dimension vectors out.
//!
//! Defines the [`EmbeddingPort`] trait and its backends:
//! - **[`DisabledEmbedder`]**: always unavailable; the default until a
//!   provider is configured.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]**: any OpenAI-compatible `/v1/embeddings` endpoint.
//! - **`LocalEmbedder`**: in-process fastembed model, behind the
//!   `local-embeddings-fastembed` feature.
//!
//! Every call is a single attempt. Failures surface as [`PortError`] with the
//! backend's message, and each call is bounded by `embedding.timeout_secs`
//! when set.
//!
//! # Provider Selection
//!
//! ```rust
//! # use docask::config::EmbeddingConfig;
//! # use docask::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::port::{http_error, with_timeout, PortError};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// A black-box text embedding capability.
#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    /// Model identifier recorded alongside the index.
    fn model_name(&self) -> &str;

    /// Cheap reachability probe, run before any document work starts.
    async fn check_available(&self) -> Result<(), PortError>;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError>;
}

/// Embed a single query text.
pub async fn embed_query(port: &dyn EmbeddingPort, text: &str) -> Result<Vec<f32>, PortError> {
    port.embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| PortError::Unavailable("empty embedding response".to_string()))
}

// ============ Disabled ============

/// Used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledEmbedder;

const DISABLED_MSG: &str =
    "embedding provider is disabled; set [embedding] provider in the config";

#[async_trait]
impl EmbeddingPort for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn check_available(&self) -> Result<(), PortError> {
        Err(PortError::Unavailable(DISABLED_MSG.to_string()))
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, PortError> {
        Err(PortError::Unavailable(DISABLED_MSG.to_string()))
    }
}

// ============ Ollama ============

/// Calls `POST /api/embed` on an Ollama server (default `http://localhost:11434`).
///
/// Requires the model to be pulled first, e.g. `ollama pull nomic-embed-text`.
pub struct OllamaEmbedder {
    model: String,
    url: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            model,
            url,
            timeout: config.timeout(),
            client: reqwest::Client::new(),
        })
    }

    fn connection_error(&self, e: reqwest::Error) -> PortError {
        PortError::Unavailable(format!(
            "Ollama connection error (is Ollama running at {}?): {}",
            self.url, e
        ))
    }
}

#[async_trait]
impl EmbeddingPort for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn check_available(&self) -> Result<(), PortError> {
        with_timeout(self.timeout, async {
            let response = self
                .client
                .get(format!("{}/api/tags", self.url))
                .send()
                .await
                .map_err(|e| self.connection_error(e))?;
            if !response.status().is_success() {
                return Err(http_error("Ollama", response).await);
            }
            Ok(())
        })
        .await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        with_timeout(self.timeout, async {
            let response = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await
                .map_err(|e| self.connection_error(e))?;
            if !response.status().is_success() {
                return Err(http_error("Ollama", response).await);
            }
            let json: serde_json::Value = response.json().await.map_err(PortError::unavailable)?;
            parse_ollama_response(&json)
        })
        .await
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, PortError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            PortError::Unavailable("invalid Ollama response: missing embeddings array".into())
        })?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| {
                    PortError::Unavailable(
                        "invalid Ollama response: embedding is not an array".into(),
                    )
                })
        })
        .collect()
}

// ============ OpenAI-compatible ============

/// Calls `POST {url}/v1/embeddings` (default `https://api.openai.com`).
///
/// The API key is read from `OPENAI_API_KEY` on each call, so a missing key
/// shows up as an unavailable backend rather than a startup failure.
pub struct OpenAIEmbedder {
    model: String,
    url: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            model,
            url,
            timeout: config.timeout(),
            client: reqwest::Client::new(),
        })
    }
}

pub(crate) fn openai_api_key() -> Result<String, PortError> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| PortError::Unavailable("OPENAI_API_KEY environment variable not set".into()))
}

#[async_trait]
impl EmbeddingPort for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn check_available(&self) -> Result<(), PortError> {
        let api_key = openai_api_key()?;
        with_timeout(self.timeout, async {
            let response = self
                .client
                .get(format!("{}/v1/models", self.url))
                .bearer_auth(&api_key)
                .send()
                .await
                .map_err(PortError::unavailable)?;
            if !response.status().is_success() {
                return Err(http_error("OpenAI", response).await);
            }
            Ok(())
        })
        .await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError> {
        let api_key = openai_api_key()?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        with_timeout(self.timeout, async {
            let response = self
                .client
                .post(format!("{}/v1/embeddings", self.url))
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await
                .map_err(PortError::unavailable)?;
            if !response.status().is_success() {
                return Err(http_error("OpenAI", response).await);
            }
            let json: serde_json::Value = response.json().await.map_err(PortError::unavailable)?;
            parse_openai_response(&json)
        })
        .await
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, PortError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| PortError::Unavailable("invalid OpenAI response: missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                PortError::Unavailable("invalid OpenAI response: missing embedding".into())
            })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        indexed.push((index, to_f32_vec(embedding)));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Build the configured [`EmbeddingPort`].
///
/// | Config Value | Backend |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"local"` | `LocalEmbedder` (needs `--features local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingPort>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_is_never_available() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        let err = embedder.check_available().await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
        assert!(embed_query(embedder.as_ref(), "hi").await.is_err());
    }

    #[test]
    fn ollama_needs_a_model() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn ollama_url_defaults_and_trims() {
        let mut config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            ..EmbeddingConfig::default()
        };
        assert_eq!(OllamaEmbedder::new(&config).unwrap().url, DEFAULT_OLLAMA_URL);
        config.url = Some("http://gpu-box:11434/".to_string());
        assert_eq!(
            OllamaEmbedder::new(&config).unwrap().url,
            "http://gpu-box:11434"
        );
    }

    #[tokio::test]
    async fn unreachable_ollama_is_unavailable() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("m".to_string()),
            url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: Some(5),
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let err = embedder.check_available().await.unwrap_err();
        assert!(matches!(err, PortError::Unavailable(_) | PortError::Timeout(_)));
    }

    #[cfg(not(feature = "local-embeddings-fastembed"))]
    #[test]
    fn local_without_feature_is_rejected() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).err().unwrap();
        assert!(err.to_string().contains("local-embeddings-fastembed"));
    }

    #[test]
    fn parses_ollama_embeddings() {
        let json = serde_json::json!({ "embeddings": [[0.5, 1.0], [-1.0, 0.0]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![0.5, 1.0], vec![-1.0, 0.0]]);
    }

    #[test]
    fn rejects_malformed_ollama_response() {
        let json = serde_json::json!({ "error": "model not found" });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn openai_embeddings_follow_input_order() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
