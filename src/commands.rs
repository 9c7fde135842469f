//! CLI command handlers. Each one drives the [`Pipeline`] and prints a
//! human-readable result to stdout.

use anyhow::Result;
use std::path::Path;

use crate::models::{Document, DocumentType, RetrievedChunk};
use crate::pipeline::Pipeline;

pub async fn run_ingest(pipeline: &Pipeline, path: &Path, declared: Option<&str>) -> Result<()> {
    let doc_type = DocumentType::resolve(path, declared)?;
    let document = Document::from_path(path, doc_type);
    let report = pipeline.rebuild(&document).await?;

    println!("ingest {}", report.document_id);
    println!("  type:     {}", report.doc_type);
    println!("  segments: {}", report.segments);
    println!("  chunks:   {}", report.chunks);
    println!("  dims:     {}", report.dims);
    println!("  model:    {}", report.model);
    println!("Document ready. Ask away.");
    Ok(())
}

pub async fn run_ask(pipeline: &Pipeline, question: &str, k: Option<usize>) -> Result<()> {
    let answer = pipeline.answer_question_with_k(question, k).await?;

    println!("{}", answer.text.trim());
    println!();
    println!("--- Sources ({}) ---", answer.sources.len());
    for hit in &answer.sources {
        println!(
            "  [chunk {}] {} ({}), score {:.3}",
            hit.chunk.chunk_index, hit.chunk.document_id, hit.chunk.locator, hit.score
        );
    }
    Ok(())
}

pub async fn run_retrieve(pipeline: &Pipeline, query: &str, k: Option<usize>) -> Result<()> {
    let hits = pipeline.retrieve(query, k).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        print_hit(rank + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &RetrievedChunk) {
    println!(
        "{}. [{:.3}] chunk {} - {}",
        rank, hit.score, hit.chunk.chunk_index, hit.chunk.locator
    );
    for line in hit.chunk.text.lines().take(6) {
        println!("    {}", line);
    }
    println!();
}

pub async fn run_status(pipeline: &Pipeline) -> Result<()> {
    let status = pipeline.status().await;
    match status.document_id {
        Some(doc) => {
            println!("document: {}", doc);
            println!("chunks:   {}", status.chunk_count.unwrap_or(0));
            println!("model:    {}", status.model.as_deref().unwrap_or("unknown"));
            println!("ready:    yes");
        }
        None => {
            println!("No document indexed. Run `docask ingest <file>` first.");
        }
    }
    Ok(())
}

pub async fn run_reset(pipeline: &Pipeline) -> Result<()> {
    pipeline.reset().await?;
    println!("Session reset. No document is active.");
    Ok(())
}
