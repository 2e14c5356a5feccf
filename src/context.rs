//! Context assembly: pack ranked chunks into a token-budgeted block.
//!
//! Chunks go in whole or not at all. Packing stops at the first candidate
//! that no longer fits, so the block is always a prefix of the ranking.

use anyhow::Result as AnyResult;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{KbError, Result};
use crate::models::Chunk;
use crate::search::query;
use crate::store::{open_store, KnowledgeBaseStore};
use crate::token::estimate_tokens;

pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// Candidates retrieved for packing; wider than what usually fits.
pub const DEFAULT_CANDIDATES: usize = 12;

/// Leading line of every non-empty context block.
pub const CONTEXT_HEADER: &str = "Relevant excerpts from the knowledge base:";

const CHUNK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub chunks_used: usize,
    /// Estimated cost including the header.
    pub tokens_used: usize,
}

/// Greedily pack `chunks` (best first) under `max_tokens`.
///
/// The header's estimated cost counts against the budget. If not even the
/// first chunk fits, the result is empty, header included.
pub fn assemble_context(chunks: &[Chunk], max_tokens: usize) -> AssembledContext {
    let header_tokens = estimate_tokens(CONTEXT_HEADER);
    let Some(mut remaining) = max_tokens.checked_sub(header_tokens) else {
        return AssembledContext::default();
    };

    let mut parts: Vec<&str> = Vec::new();
    for chunk in chunks {
        if chunk.token_count > remaining {
            break;
        }
        remaining -= chunk.token_count;
        parts.push(&chunk.text);
    }

    if parts.is_empty() {
        return AssembledContext::default();
    }

    let mut text = String::from(CONTEXT_HEADER);
    for part in &parts {
        text.push_str(CHUNK_SEPARATOR);
        text.push_str(part);
    }

    AssembledContext {
        text,
        chunks_used: parts.len(),
        tokens_used: max_tokens - remaining,
    }
}

/// Retrieve the best candidates for `question` and pack them.
///
/// Returns an empty string when nothing relevant fits.
pub async fn build_context(
    store: &KnowledgeBaseStore,
    kb_id: &str,
    question: &str,
    max_tokens: Option<usize>,
) -> Result<String> {
    build_context_with(store, kb_id, question, max_tokens, DEFAULT_CANDIDATES)
        .await
        .map(|assembled| assembled.text)
}

/// [`build_context`] with an explicit candidate pool, returning the packing
/// details.
pub async fn build_context_with(
    store: &KnowledgeBaseStore,
    kb_id: &str,
    question: &str,
    max_tokens: Option<usize>,
    candidates: usize,
) -> Result<AssembledContext> {
    let max_tokens = max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if max_tokens == 0 {
        return Err(KbError::InvalidQuery("max_tokens must be at least 1".into()));
    }

    let ranked = query(store, kb_id, question, Some(candidates)).await?;
    let assembled = assemble_context(&ranked, max_tokens);
    debug!(
        kb_id,
        candidates = ranked.len(),
        chunks_used = assembled.chunks_used,
        tokens_used = assembled.tokens_used,
        max_tokens,
        "context assembled"
    );
    Ok(assembled)
}

pub async fn run_context(
    config: &Config,
    kb_id: &str,
    question: &str,
    max_tokens: Option<usize>,
) -> AnyResult<()> {
    let store = open_store(config).await?;
    let max_tokens = max_tokens.unwrap_or(config.retrieval.max_context_tokens);
    let assembled = build_context_with(
        &store,
        kb_id,
        question,
        Some(max_tokens),
        config.retrieval.context_candidates,
    )
    .await?;

    if assembled.text.is_empty() {
        eprintln!("No relevant context.");
        return Ok(());
    }

    println!("{}", assembled.text);
    eprintln!(
        "{} chunks, ~{} of {} tokens",
        assembled.chunks_used, assembled.tokens_used, max_tokens
    );
    Ok(())
}
