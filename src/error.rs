//! Error taxonomy for the document-to-answer pipeline.
//!
//! Every failure the core can produce is a [`QaError`] variant. Callers that
//! only need to tell the user *what kind* of problem happened use
//! [`QaError::category`], which collapses the variants into the four
//! user-visible situations (plus malformed requests):
//!
//! | Category | Variants |
//! |----------|----------|
//! | [`ErrorCategory::NoDocument`] | `NoActiveIndex` |
//! | [`ErrorCategory::DocumentFailed`] | `UnsupportedType`, `LoadFailure`, `EmptyInput` |
//! | [`ErrorCategory::BackendUnavailable`] | `EmbeddingUnavailable`, `GenerationUnavailable` |
//! | [`ErrorCategory::BadRequest`] | `EmptyQuestion` |
//! | [`ErrorCategory::Internal`] | `InvalidConfig`, `Index` |

use thiserror::Error;

use crate::port::PortError;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("unsupported document type: '{0}' (expected pdf, text, or tabular)")]
    UnsupportedType(String),

    #[error("could not load document: {0}")]
    LoadFailure(String),

    #[error("document contains no text to index")]
    EmptyInput,

    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(#[source] PortError),

    #[error("generation backend unavailable: {0}")]
    GenerationUnavailable(#[source] PortError),

    #[error("no document has been indexed yet; upload a document first")]
    NoActiveIndex,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("vector index error: {0}")]
    Index(String),
}

/// User-visible classification of a [`QaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Nothing uploaded yet, or the last upload failed. Expected, not a fault.
    NoDocument,
    /// The uploaded document could not be turned into an index.
    DocumentFailed,
    /// The embedding or generation backend is down or timed out.
    BackendUnavailable,
    /// The request itself was malformed.
    BadRequest,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::NoDocument => "no_document",
            ErrorCategory::DocumentFailed => "document_failed",
            ErrorCategory::BackendUnavailable => "backend_unavailable",
            ErrorCategory::BadRequest => "bad_request",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl QaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QaError::NoActiveIndex => ErrorCategory::NoDocument,
            QaError::UnsupportedType(_) | QaError::LoadFailure(_) | QaError::EmptyInput => {
                ErrorCategory::DocumentFailed
            }
            QaError::EmbeddingUnavailable(_) | QaError::GenerationUnavailable(_) => {
                ErrorCategory::BackendUnavailable
            }
            QaError::EmptyQuestion => ErrorCategory::BadRequest,
            QaError::InvalidConfig(_) | QaError::Index(_) => ErrorCategory::Internal,
        }
    }

    pub(crate) fn index<E: std::fmt::Display>(err: E) -> Self {
        QaError::Index(err.to_string())
    }
}

impl From<sqlx::Error> for QaError {
    fn from(err: sqlx::Error) -> Self {
        QaError::index(err)
    }
}
