//! Relevance scoring and top-K retrieval.
//!
//! Scoring is plain term overlap. The question is normalized to lowercase
//! alphanumeric terms of at least three characters; each term counts every
//! word-boundary occurrence in the chunk that *starts* with it, so `cache`
//! matches `caches` and `cached` but not `precache`. The raw count is
//! divided by the square root of the chunk's token count so short, dense
//! chunks rank above long ones that mention a term in passing.
//!
//! Retrieval never errors for "nothing relevant": an unknown or empty
//! knowledge base yields an empty list.

use anyhow::Result as AnyResult;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{KbError, Result};
use crate::models::Chunk;
use crate::store::{open_store, KnowledgeBaseStore};

/// Number of chunks `query` returns when the caller does not say.
pub const DEFAULT_TOP_K: usize = 8;

/// Query terms shorter than this are ignored.
const MIN_TERM_CHARS: usize = 3;

/// A chunk together with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// A normalized question, compiled once and reused across every chunk.
pub struct QueryTerms {
    terms: Vec<String>,
    patterns: Vec<Regex>,
}

impl QueryTerms {
    pub fn parse(question: &str) -> Self {
        let normalized: String = question
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
            .collect();

        let terms: Vec<String> = normalized
            .split_whitespace()
            .filter(|t| t.len() >= MIN_TERM_CHARS)
            .map(str::to_string)
            .collect();

        // Terms are [a-z0-9]+ so escaping never changes them; the pattern is
        // always valid.
        let patterns = terms
            .iter()
            .filter_map(|t| Regex::new(&format!(r"\b{}", regex::escape(t))).ok())
            .collect();

        Self { terms, patterns }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Total prefix-anchored occurrences of every term in `text`.
    pub fn count_matches(&self, text: &str) -> usize {
        let lowered = text.to_lowercase();
        self.patterns
            .iter()
            .map(|p| p.find_iter(&lowered).count())
            .sum()
    }
}

/// Relevance of `chunk` to the query. Zero means no term occurred.
pub fn score_chunk(chunk: &Chunk, terms: &QueryTerms) -> f64 {
    let raw = terms.count_matches(&chunk.text);
    if raw == 0 {
        return 0.0;
    }
    if chunk.token_count == 0 {
        return raw as f64;
    }
    raw as f64 / (chunk.token_count as f64).sqrt()
}

fn validate(question: &str, top_k: usize) -> Result<()> {
    if question.trim().is_empty() {
        return Err(KbError::InvalidQuery("question is empty".into()));
    }
    if top_k == 0 {
        return Err(KbError::InvalidQuery("top_k must be at least 1".into()));
    }
    Ok(())
}

/// Score every chunk, drop the zero scores, and keep the best `top_k`.
///
/// Equal scores keep their original chunk order.
pub fn rank_chunks(chunks: &[Chunk], question: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
    validate(question, top_k)?;

    let terms = QueryTerms::parse(question);
    if terms.is_empty() || chunks.is_empty() {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(usize, f64)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i, score_chunk(c, &terms)))
        .filter(|(_, s)| *s > 0.0)
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);

    debug!(
        candidates = chunks.len(),
        returned = scored.len(),
        terms = ?terms.terms(),
        "chunks ranked"
    );

    Ok(scored
        .into_iter()
        .map(|(i, score)| ScoredChunk {
            chunk: chunks[i].clone(),
            score,
        })
        .collect())
}

/// Ranked chunks with scores for one knowledge base.
///
/// An unknown knowledge base is an empty result, not an error.
pub async fn search(
    store: &KnowledgeBaseStore,
    kb_id: &str,
    question: &str,
    top_k: Option<usize>,
) -> Result<Vec<ScoredChunk>> {
    let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
    validate(question, top_k)?;

    match store
        .with_base(kb_id, |kb| rank_chunks(&kb.chunks, question, top_k))
        .await
    {
        Ok(ranked) => ranked,
        Err(KbError::KnowledgeBaseNotFound(_)) => {
            debug!(kb_id, "query against unknown knowledge base");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// The `top_k` most relevant chunks of a knowledge base, best first.
pub async fn query(
    store: &KnowledgeBaseStore,
    kb_id: &str,
    question: &str,
    top_k: Option<usize>,
) -> Result<Vec<Chunk>> {
    Ok(search(store, kb_id, question, top_k)
        .await?
        .into_iter()
        .map(|s| s.chunk)
        .collect())
}

pub async fn run_query(
    config: &Config,
    kb_id: &str,
    question: &str,
    top_k: Option<usize>,
    json: bool,
) -> AnyResult<()> {
    let store = open_store(config).await?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let results = search(&store, kb_id, question, Some(top_k)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let chunk = &result.chunk;
        match chunk.page_number {
            Some(page) => println!(
                "{}. [{:.3}] source {} / page {}",
                i + 1,
                result.score,
                chunk.source_index,
                page
            ),
            None => println!(
                "{}. [{:.3}] source {}",
                i + 1,
                result.score,
                chunk.source_index
            ),
        }
        println!("    tokens: {}", chunk.token_count);
        println!("    excerpt: \"{}\"", excerpt(&chunk.text, 240));
        println!("    id: {}", chunk.id);
        println!();
    }

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
