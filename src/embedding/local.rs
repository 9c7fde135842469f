//! In-process embeddings via fastembed (ONNX Runtime bundled).
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that no network calls are made. Inference runs on a blocking thread.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::EmbeddingPort;
use crate::config::EmbeddingConfig;
use crate::port::{with_timeout, PortError};

const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    batch_size: usize,
    timeout: Option<Duration>,
    // Initialised lazily so `status` and `reset` never pay the model load.
    engine: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let model = to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            batch_size: config.batch_size,
            timeout: config.timeout(),
            engine: Arc::new(Mutex::new(None)),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, PortError> {
        let engine = Arc::clone(&self.engine);
        let model = self.model.clone();
        let batch_size = self.batch_size;

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = engine
                .lock()
                .map_err(|_| PortError::Unavailable("local embedding model lock poisoned".into()))?;
            if guard.is_none() {
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| {
                    PortError::Unavailable(format!(
                        "failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(loaded);
            }
            match guard.as_mut() {
                Some(engine) => engine
                    .embed(texts, Some(batch_size))
                    .map_err(|e| PortError::Unavailable(format!("local embedding failed: {}", e))),
                None => Err(PortError::Unavailable("local embedding model not loaded".into())),
            }
        });

        with_timeout(self.timeout, async {
            task.await
                .map_err(|e| PortError::Unavailable(format!("local embedding task failed: {}", e)))?
        })
        .await
    }
}

#[async_trait]
impl EmbeddingPort for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn check_available(&self) -> Result<(), PortError> {
        self.run(Vec::new()).await.map(|_| ())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError> {
        self.run(texts.to_vec()).await
    }
}

fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}
