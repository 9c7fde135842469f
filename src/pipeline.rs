//! The two boundaries the outside world talks to.
//!
//! [`Pipeline`] wires the session, indexer, retriever and synthesizer
//! together. The upload side calls [`Pipeline::rebuild`]; the question side
//! calls [`Pipeline::answer_question`]. Both the CLI and the HTTP server are
//! thin layers over this type.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::answer::Synthesizer;
use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingPort};
use crate::error::QaError;
use crate::generation::{create_generator, GenerationPort};
use crate::indexer::Indexer;
use crate::models::{Answer, Document, IndexReport, RetrievedChunk, SessionStatus};
use crate::retriever::Retriever;
use crate::session::Session;

pub struct Pipeline {
    session: Arc<Session>,
    indexer: Indexer,
    retriever: Retriever,
    synthesizer: Synthesizer,
    top_k: usize,
}

impl Pipeline {
    /// Build the configured backends and restore any persisted index.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)
            .context("Failed to create embedding provider")?;
        let generator = create_generator(&config.generation)
            .context("Failed to create generation provider")?;
        let session = Session::restore(&config.index.dir, embedder.model_name()).await;
        let session = Arc::new(session);
        Ok(Self::new(config, session, embedder, generator))
    }

    /// Assemble a pipeline from explicit parts.
    pub fn new(
        config: &Config,
        session: Arc<Session>,
        embedder: Arc<dyn EmbeddingPort>,
        generator: Arc<dyn GenerationPort>,
    ) -> Self {
        Self {
            session,
            indexer: Indexer::new(
                Arc::clone(&embedder),
                config.chunking.clone(),
                config.embedding.batch_size,
            ),
            retriever: Retriever::new(embedder),
            synthesizer: Synthesizer::new(generator),
            top_k: config.retrieval.top_k,
        }
    }

    /// Replace the active document. On failure the session is left empty.
    pub async fn rebuild(&self, document: &Document) -> Result<IndexReport, QaError> {
        self.indexer.rebuild(&self.session, document).await
    }

    /// Retrieve the chunks closest to `query`; `k` defaults to `retrieval.top_k`.
    pub async fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>, QaError> {
        let query = non_empty(query)?;
        self.retriever
            .retrieve(&self.session, query, k.unwrap_or(self.top_k))
            .await
    }

    /// Answer `query` from the active document.
    pub async fn answer_question(&self, query: &str) -> Result<Answer, QaError> {
        self.answer_question_with_k(query, None).await
    }

    pub async fn answer_question_with_k(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Answer, QaError> {
        let query = non_empty(query)?;
        let sources = self
            .retriever
            .retrieve(&self.session, query, k.unwrap_or(self.top_k))
            .await?;
        let text = self.synthesizer.answer(query, &sources).await?;
        Ok(Answer { text, sources })
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.status().await
    }

    pub async fn reset(&self) -> Result<(), QaError> {
        self.session.reset().await?;
        info!("session reset");
        Ok(())
    }
}

fn non_empty(query: &str) -> Result<&str, QaError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QaError::EmptyQuestion);
    }
    Ok(query)
}
