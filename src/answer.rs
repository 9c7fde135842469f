//! Grounded answer synthesis.
//!
//! The retrieved chunks are packed into a single prompt that instructs the
//! model to answer only from that context, and the generation backend is
//! called exactly once. Grounding is enforced by the prompt alone.

use std::sync::Arc;

use tracing::info;

use crate::error::QaError;
use crate::generation::GenerationPort;
use crate::models::RetrievedChunk;

/// Fixed reply the model is told to give when the context has no answer.
pub const NO_ANSWER: &str = "The document does not provide an answer to this question.";

/// Build the grounding prompt for `query` over `chunks`.
///
/// Layout: instruction header, `Context:` with chunk texts separated by
/// blank lines, then `Question:`.
pub fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an AI assistant. Answer the question based ONLY on the following context.\n\
         If the context does not contain the answer, state that \"{no_answer}\"\n\
         Do not use any information outside of the provided context.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {query}",
        no_answer = NO_ANSWER,
        context = context,
        query = query,
    )
}

pub struct Synthesizer {
    generator: Arc<dyn GenerationPort>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn GenerationPort>) -> Self {
        Self { generator }
    }

    pub async fn answer(&self, query: &str, chunks: &[RetrievedChunk]) -> Result<String, QaError> {
        let prompt = build_prompt(query, chunks);
        let text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(QaError::GenerationUnavailable)?;
        info!(
            model = %self.generator.model_name(),
            context_chunks = chunks.len(),
            answer_chars = text.chars().count(),
            "answer generated"
        );
        Ok(text)
    }
}
