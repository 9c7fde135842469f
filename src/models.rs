//! Core data models used throughout docask.
//!
//! These types represent the document, its loaded segments, the chunks that
//! are embedded and indexed, and what retrieval and answering hand back.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::QaError;

/// The fixed set of document types the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Text,
    Tabular,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Text => "text",
            DocumentType::Tabular => "tabular",
        }
    }

    /// Map an upload's file extension (`pdf`, `txt`, `csv`) to its type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentType::Pdf),
            "txt" => Some(DocumentType::Text),
            "csv" => Some(DocumentType::Tabular),
            _ => None,
        }
    }

    /// Use the declared tag when given, otherwise infer from `path`'s extension.
    pub fn resolve(path: &Path, declared: Option<&str>) -> Result<Self, QaError> {
        if let Some(tag) = declared {
            return tag.parse();
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext).ok_or_else(|| {
            QaError::UnsupportedType(if ext.is_empty() {
                "(no extension)".to_string()
            } else {
                ext.to_string()
            })
        })
    }
}

impl FromStr for DocumentType {
    type Err = QaError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "pdf" => Ok(DocumentType::Pdf),
            "text" => Ok(DocumentType::Text),
            "tabular" => Ok(DocumentType::Tabular),
            other => Err(QaError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded file, as handed over by the upload layer.
#[derive(Debug, Clone)]
pub struct Document {
    /// Sanitized filename; doubles as the source id on every chunk.
    pub id: String,
    pub doc_type: DocumentType,
    pub path: PathBuf,
}

impl Document {
    pub fn new(id: impl Into<String>, doc_type: DocumentType, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            doc_type,
            path: path.into(),
        }
    }

    /// Build a document whose id is the file name of `path`.
    pub fn from_path(path: impl Into<PathBuf>, doc_type: DocumentType) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self { id, doc_type, path }
    }
}

/// Where inside the source document a segment (and its chunks) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "n", rename_all = "lowercase")]
pub enum Locator {
    /// The whole file (plain text).
    Whole,
    /// 1-based PDF page.
    Page(u32),
    /// 0-based data row of a tabular file.
    Row(u32),
}

impl Locator {
    /// Compact form used for persistence: `whole`, `page:3`, `row:0`.
    pub fn encode(&self) -> String {
        match self {
            Locator::Whole => "whole".to_string(),
            Locator::Page(n) => format!("page:{}", n),
            Locator::Row(n) => format!("row:{}", n),
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        if s == "whole" {
            return Some(Locator::Whole);
        }
        let (kind, n) = s.split_once(':')?;
        let n = n.parse().ok()?;
        match kind {
            "page" => Some(Locator::Page(n)),
            "row" => Some(Locator::Row(n)),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Whole => f.write_str("whole document"),
            Locator::Page(n) => write!(f, "page {}", n),
            Locator::Row(n) => write!(f, "row {}", n),
        }
    }
}

/// Loaded text plus provenance. Produced by the loader, consumed by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub document_id: String,
    pub locator: Locator,
    pub text: String,
}

/// A bounded slice of segment text; the unit stored in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub locator: Locator,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by retrieval, with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Summary of a successful index rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub document_id: String,
    pub doc_type: DocumentType,
    pub segments: usize,
    pub chunks: usize,
    pub dims: usize,
    pub model: String,
}

/// A generated answer and the context it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Snapshot of the session for status displays.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub ready: bool,
    pub document_id: Option<String>,
    pub chunk_count: Option<usize>,
    pub model: Option<String>,
}
