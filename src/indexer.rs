//! Document → active index.
//!
//! A rebuild runs these steps in order:
//!
//! 0. probe the embedding backend (fail fast before touching the file);
//! 1. load the document into segments;
//! 2. split segments into chunks;
//! 3. embed every chunk in batches;
//! 4. swap the new index into the [`Session`].
//!
//! Steps 0–3 run without the session lock, so questions keep being answered
//! from the previous index meanwhile. Any failure resets the session: the
//! old index is not kept as a fallback.
//!
//! Rebuilds are serialized on the session's rebuild guard. A slow attempt
//! can never swap in or clear after a later one has finished.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chunk;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingPort;
use crate::error::QaError;
use crate::loader;
use crate::models::{Chunk, Document, IndexReport};
use crate::port::PortError;
use crate::session::Session;

pub struct Indexer {
    embedder: Arc<dyn EmbeddingPort>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn EmbeddingPort>, chunking: ChunkingConfig, batch_size: usize) -> Self {
        Self {
            embedder,
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    /// Rebuild the session's index from `document`.
    pub async fn rebuild(
        &self,
        session: &Session,
        document: &Document,
    ) -> Result<IndexReport, QaError> {
        let _rebuild = session.begin_rebuild().await;
        match self.try_rebuild(session, document).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(document = %document.id, error = %e, "rebuild failed; clearing active index");
                if let Err(reset_err) = session.clear().await {
                    warn!(error = %reset_err, "could not clear index after failed rebuild");
                }
                Err(e)
            }
        }
    }

    async fn try_rebuild(
        &self,
        session: &Session,
        document: &Document,
    ) -> Result<IndexReport, QaError> {
        self.embedder
            .check_available()
            .await
            .map_err(QaError::EmbeddingUnavailable)?;

        info!(document = %document.id, doc_type = %document.doc_type, "loading document");
        let segments = loader::load_document(document).await?;

        let chunks = chunk::split(
            &segments,
            self.chunking.max_chunk_size,
            self.chunking.overlap,
        )?;
        info!(
            segments = segments.len(),
            chunks = chunks.len(),
            "document split into chunks"
        );

        let vectors = self.embed_chunks(&chunks).await?;
        let model = self.embedder.model_name().to_string();

        let dims = session
            .replace(&document.id, &model, &chunks, &vectors)
            .await?;
        info!(document = %document.id, chunks = chunks.len(), dims, model = %model, "index ready");

        Ok(IndexReport {
            document_id: document.id.clone(),
            doc_type: document.doc_type,
            segments: segments.len(),
            chunks: chunks.len(),
            dims,
            model,
        })
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, QaError> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(QaError::EmbeddingUnavailable)?;

            if batch_vectors.len() != texts.len() {
                return Err(inconsistent(format!(
                    "backend returned {} vectors for {} texts",
                    batch_vectors.len(),
                    texts.len()
                )));
            }
            vectors.extend(batch_vectors);
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if dims == 0 {
            return Err(inconsistent("backend returned empty vectors".to_string()));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            return Err(inconsistent(format!(
                "vector {} has {} dimensions, expected {}",
                bad,
                vectors[bad].len(),
                dims
            )));
        }
        Ok(vectors)
    }
}

fn inconsistent(reason: String) -> QaError {
    QaError::EmbeddingUnavailable(PortError::Unavailable(reason))
}
