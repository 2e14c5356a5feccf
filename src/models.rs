//! Core data models for knowledge bases, their sources, and chunks.
//!
//! A [`KnowledgeBase`] owns an ordered list of [`Source`]s and an ordered
//! list of [`Chunk`]s. A chunk points at its source by position
//! (`source_index`), not by identity: removing a source renumbers every
//! chunk that belonged to a later source.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KbError;

/// The kind of material a source was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    DocumentPdf,
    DocumentDocx,
    PlainText,
    Url,
    PastedText,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::DocumentPdf,
        SourceKind::DocumentDocx,
        SourceKind::PlainText,
        SourceKind::Url,
        SourceKind::PastedText,
    ];

    /// Canonical kebab-case name, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::DocumentPdf => "document-pdf",
            SourceKind::DocumentDocx => "document-docx",
            SourceKind::PlainText => "plain-text",
            SourceKind::Url => "url",
            SourceKind::PastedText => "pasted-text",
        }
    }

    /// Whether the kind carries page structure.
    pub fn is_paginated(&self) -> bool {
        matches!(self, SourceKind::DocumentPdf | SourceKind::DocumentDocx)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document-pdf" | "pdf" => Ok(SourceKind::DocumentPdf),
            "document-docx" | "docx" => Ok(SourceKind::DocumentDocx),
            "plain-text" | "text" | "txt" => Ok(SourceKind::PlainText),
            "url" => Ok(SourceKind::Url),
            "pasted-text" | "paste" => Ok(SourceKind::PastedText),
            _ => Err(KbError::UnsupportedSourceKind(s.to_string())),
        }
    }
}

/// One ingested unit of material. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

/// An atomic retrievable fragment of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    pub token_count: usize,
}

/// A named collection of sources and the chunks derived from them.
///
/// `total_chunks` and `total_tokens` are derived; they are only ever
/// written by [`KnowledgeBase::recompute_totals`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub total_chunks: usize,
    #[serde(default)]
    pub total_tokens: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base with a fresh id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            sources: Vec::new(),
            chunks: Vec::new(),
            total_chunks: 0,
            total_tokens: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-derive the aggregate counters from `chunks`.
    pub fn recompute_totals(&mut self) {
        self.total_chunks = self.chunks.len();
        self.total_tokens = self.chunks.iter().map(|c| c.token_count).sum();
    }

    /// Bump `updated_at`, keeping it monotonic even if the clock steps back.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn summary(&self) -> KnowledgeBaseSummary {
        KnowledgeBaseSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            sources: self.sources.clone(),
            total_chunks: self.total_chunks,
            total_tokens: self.total_tokens,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A knowledge base without its chunks, for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sources: Vec<Source>,
    pub total_chunks: usize,
    pub total_tokens: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata changes for [`crate::store::KnowledgeBaseStore::update`].
/// `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBaseUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Already-extracted text for a new source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceContent {
    /// One continuous body of text.
    Text(String),
    /// Per-page text; page numbers are assigned 1-based in order.
    Pages(Vec<String>),
}

impl From<String> for SourceContent {
    fn from(text: String) -> Self {
        SourceContent::Text(text)
    }
}

impl From<&str> for SourceContent {
    fn from(text: &str) -> Self {
        SourceContent::Text(text.to_string())
    }
}

/// Everything needed to append one source to a knowledge base.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub kind: SourceKind,
    pub content: SourceContent,
    pub label: Option<String>,
    pub url: Option<String>,
}

impl NewSource {
    pub fn new(kind: SourceKind, content: impl Into<SourceContent>) -> Self {
        Self {
            kind,
            content: content.into(),
            label: None,
            url: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Counts of what a single `add_source` call appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSourceOutcome {
    pub chunks_added: usize,
    pub tokens_added: usize,
}
