use std::sync::Arc;

use tracing::debug;

use crate::embedding::{embed_query, EmbeddingPort};
use crate::error::QaError;
use crate::models::RetrievedChunk;
use crate::session::Session;

/// Query → most similar chunks of the active document.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingPort>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingPort>) -> Self {
        Self { embedder }
    }

    /// Return up to `k` chunks ordered by descending similarity.
    ///
    /// Fails with [`QaError::NoActiveIndex`] before calling the embedding
    /// backend when nothing has been indexed.
    pub async fn retrieve(
        &self,
        session: &Session,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, QaError> {
        if !session.is_ready().await {
            return Err(QaError::NoActiveIndex);
        }

        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(QaError::EmbeddingUnavailable)?;

        let hits = session.search(&query_vec, k).await?;
        debug!(
            k,
            returned = hits.len(),
            chunks = ?hits.iter().map(|h| h.chunk.chunk_index).collect::<Vec<_>>(),
            "retrieved"
        );
        Ok(hits)
    }
}
