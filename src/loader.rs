//! Document loading: declared type → ordered text segments.
//!
//! Dispatch is on the declared [`DocumentType`], never on file content.
//! Each type has one strategy:
//!
//! | Type | Segments | Locator |
//! |------|----------|---------|
//! | `pdf` | one per page, via `pdf-extract` | `Page(n)`, 1-based |
//! | `text` | exactly one, the whole file as UTF-8 | `Whole` |
//! | `tabular` | one per CSV data row, `header: value` lines | `Row(n)`, 0-based |
//!
//! Loading is all-or-nothing: any failure is a [`QaError::LoadFailure`] and
//! no segments are returned.

use std::path::Path;

use crate::error::QaError;
use crate::models::{Document, DocumentType, Locator, Segment};

/// Load a document on a blocking thread.
///
/// PDF extraction and CSV parsing are CPU-bound and do synchronous file I/O,
/// so they stay off the async runtime.
pub async fn load_document(document: &Document) -> Result<Vec<Segment>, QaError> {
    let path = document.path.clone();
    let doc_type = document.doc_type;
    let id = document.id.clone();
    tokio::task::spawn_blocking(move || load(&path, doc_type, &id))
        .await
        .map_err(|e| QaError::LoadFailure(format!("loader task failed: {}", e)))?
}

/// Load `path` as `doc_type`, tagging every segment with `document_id`.
pub fn load(path: &Path, doc_type: DocumentType, document_id: &str) -> Result<Vec<Segment>, QaError> {
    let segments = match doc_type {
        DocumentType::Pdf => load_pdf(path, document_id)?,
        DocumentType::Text => load_text(path, document_id)?,
        DocumentType::Tabular => load_tabular(path, document_id)?,
    };
    if segments.is_empty() {
        return Err(QaError::LoadFailure(format!(
            "{} produced no {} content",
            path.display(),
            doc_type
        )));
    }
    Ok(segments)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, QaError> {
    std::fs::read(path)
        .map_err(|e| QaError::LoadFailure(format!("cannot read {}: {}", path.display(), e)))
}

fn load_pdf(path: &Path, document_id: &str) -> Result<Vec<Segment>, QaError> {
    let bytes = read_bytes(path)?;
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .map_err(|_| {
            QaError::LoadFailure(format!("PDF extraction panicked on {}", path.display()))
        })?
        .map_err(|e| QaError::LoadFailure(format!("PDF extraction failed: {}", e)))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| Segment {
            document_id: document_id.to_string(),
            locator: Locator::Page(i as u32 + 1),
            text,
        })
        .collect())
}

fn load_text(path: &Path, document_id: &str) -> Result<Vec<Segment>, QaError> {
    let bytes = read_bytes(path)?;
    let text = String::from_utf8(bytes).map_err(|e| {
        QaError::LoadFailure(format!("{} is not valid UTF-8: {}", path.display(), e))
    })?;
    Ok(vec![Segment {
        document_id: document_id.to_string(),
        locator: Locator::Whole,
        text,
    }])
}

fn load_tabular(path: &Path, document_id: &str) -> Result<Vec<Segment>, QaError> {
    let csv_err = |e: csv::Error| QaError::LoadFailure(format!("CSV parse failed: {}", e));

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| QaError::LoadFailure(format!("cannot read {}: {}", path.display(), e)))?;

    let headers: Vec<String> = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut segments = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let text = headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}: {}", h, record.get(i).unwrap_or("").trim()))
            .collect::<Vec<_>>()
            .join("\n");
        segments.push(Segment {
            document_id: document_id.to_string(),
            locator: Locator::Row(row as u32),
            text,
        });
    }
    Ok(segments)
}
