//! Error types for knowledge base operations.
//!
//! Every failure is returned to the immediate caller. Nothing here is
//! retried internally: the operations are deterministic over already
//! ingested data, so retrying with the same input reproduces the same
//! outcome.

use thiserror::Error;

use crate::extract::ExtractError;

/// The error type for all store, retrieval, and ingestion operations.
#[derive(Debug, Error)]
pub enum KbError {
    #[error("knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("source index {index} out of range for knowledge base {kb_id} ({len} sources)")]
    SourceNotFound {
        kb_id: String,
        index: usize,
        len: usize,
    },

    #[error("unsupported source kind: '{0}'. Expected document-pdf, document-docx, plain-text, url, or pasted-text")]
    UnsupportedSourceKind(String),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KbError {
    /// True for both a missing knowledge base and an out-of-range source index.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            KbError::KnowledgeBaseNotFound(_) | KbError::SourceNotFound { .. }
        )
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, KbError>;
