//! Sentence-aligned text chunker with overlap.
//!
//! Splits extracted source text into [`Chunk`]s sized near a target token
//! budget. Chunk boundaries always fall between sentences, and consecutive
//! chunks share a short overlap tail so content near a boundary is
//! retrievable from either side.
//!
//! # Algorithm
//!
//! 1. Split text into sentences on `.`, `!`, or `?` followed by whitespace.
//! 2. Accumulate sentences into a buffer, tracking estimated tokens.
//! 3. When the next sentence would push a non-empty buffer over
//!    `target_tokens`, flush the buffer as a chunk.
//! 4. Seed the next buffer with the flushed chunk's trailing sentences,
//!    walking backward while they fit in `overlap_tokens`.
//! 5. Flush whatever remains at the end.
//!
//! Chunks whose trimmed text is not longer than `min_fragment_chars` are
//! dropped. A single sentence larger than the target is still emitted whole;
//! the target is not a hard ceiling.
//!
//! # Example
//!
//! ```rust
//! use kb_harness::chunk::{chunk_text, ChunkerOptions};
//!
//! let chunks = chunk_text(
//!     "Cats are small mammals. Dogs are loyal companions.",
//!     0,
//!     None,
//!     &ChunkerOptions::default(),
//! );
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source_index, 0);
//! ```

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, SourceContent};
use crate::token::estimate_tokens;

/// End-of-sentence punctuation followed by whitespace.
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("sentence boundary pattern is valid"));

/// Sizing knobs for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerOptions {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub min_fragment_chars: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            target_tokens: 400,
            overlap_tokens: 50,
            min_fragment_chars: 20,
        }
    }
}

impl From<&ChunkingConfig> for ChunkerOptions {
    fn from(cfg: &ChunkingConfig) -> Self {
        Self {
            target_tokens: cfg.target_tokens,
            overlap_tokens: cfg.overlap_tokens,
            min_fragment_chars: cfg.min_fragment_chars,
        }
    }
}

/// Split text into trimmed, non-empty sentences.
///
/// Terminal punctuation stays with its sentence. Text without any sentence
/// boundary comes back as a single sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Chunk one body of text belonging to the source at `source_index`.
///
/// Empty or whitespace-only text yields no chunks.
pub fn chunk_text(
    text: &str,
    source_index: usize,
    page_number: Option<usize>,
    opts: &ChunkerOptions,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut buf_tokens = 0usize;

    for sentence in split_sentences(text) {
        let tokens = estimate_tokens(sentence);

        if !buf.is_empty() && buf_tokens + tokens > opts.target_tokens {
            push_chunk(&mut chunks, &buf, source_index, page_number, opts);
            buf = overlap_tail(&buf, opts.overlap_tokens);
            buf_tokens = buf.iter().map(|s| estimate_tokens(s)).sum();
        }

        buf.push(sentence);
        buf_tokens += tokens;
    }

    if !buf.is_empty() {
        push_chunk(&mut chunks, &buf, source_index, page_number, opts);
    }

    chunks
}

/// Chunk a source's full content, numbering pages 1-based when present.
pub fn chunk_source(
    content: &SourceContent,
    source_index: usize,
    opts: &ChunkerOptions,
) -> Vec<Chunk> {
    match content {
        SourceContent::Text(text) => chunk_text(text, source_index, None, opts),
        SourceContent::Pages(pages) => pages
            .iter()
            .enumerate()
            .flat_map(|(i, page)| chunk_text(page, source_index, Some(i + 1), opts))
            .collect(),
    }
}

/// Trailing sentences of a flushed buffer that fit in the overlap budget.
///
/// Never carries the whole buffer forward, otherwise the next chunk would
/// wholly contain the previous one.
fn overlap_tail<'a>(flushed: &[&'a str], overlap_tokens: usize) -> Vec<&'a str> {
    let mut tail = Vec::new();
    let mut used = 0usize;
    for sentence in flushed.iter().skip(1).rev() {
        let tokens = estimate_tokens(sentence);
        if used + tokens > overlap_tokens {
            break;
        }
        used += tokens;
        tail.push(*sentence);
    }
    tail.reverse();
    tail
}

fn push_chunk(
    chunks: &mut Vec<Chunk>,
    sentences: &[&str],
    source_index: usize,
    page_number: Option<usize>,
    opts: &ChunkerOptions,
) {
    let text = sentences.join(" ");
    let text = text.trim();
    if text.chars().count() <= opts.min_fragment_chars {
        return;
    }
    chunks.push(Chunk {
        id: Uuid::new_v4().to_string(),
        text: text.to_string(),
        source_index,
        page_number,
        token_count: estimate_tokens(text),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(target: usize, overlap: usize) -> ChunkerOptions {
        ChunkerOptions {
            target_tokens: target,
            overlap_tokens: overlap,
            min_fragment_chars: 20,
        }
    }

    /// Each sentence is seven words, so ten estimated tokens.
    fn numbered_sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {} talks about topic {}.", i, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("One fish. Two fish!  Red fish?\nBlue fish");
        assert_eq!(s, vec!["One fish.", "Two fish!", "Red fish?", "Blue fish"]);
    }

    #[test]
    fn test_split_keeps_decimal_points() {
        let s = split_sentences("Version 2.5 shipped today. It is faster.");
        assert_eq!(s, vec!["Version 2.5 shipped today.", "It is faster."]);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let text = "Cats are small mammals. Dogs are loyal companions.";
        let chunks = chunk_text(text, 2, None, &ChunkerOptions::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].source_index, 2);
        assert_eq!(chunks[0].page_number, None);
        assert_eq!(chunks[0].token_count, estimate_tokens(text));
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 0, None, &ChunkerOptions::default()).is_empty());
        assert!(chunk_text("  \n\t ", 0, None, &ChunkerOptions::default()).is_empty());
    }

    #[test]
    fn test_short_fragment_dropped() {
        let chunks = chunk_text("Too short.", 0, None, &ChunkerOptions::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_no_chunk_below_threshold() {
        let text = format!("{} Ok. Yes.", numbered_sentences(30));
        for c in chunk_text(&text, 0, None, &opts(40, 15)) {
            assert!(c.text.trim().chars().count() > 20, "short chunk: {:?}", c.text);
        }
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = format!("{}.", vec!["word"; 200].join(" "));
        let text = format!("A short opening sentence here. {}", long);
        let chunks = chunk_text(&text, 0, None, &opts(50, 10));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, long);
        assert!(chunks[1].token_count > 50);
    }

    #[test]
    fn test_chunks_near_target() {
        let text = numbered_sentences(20);
        let chunks = chunk_text(&text, 0, None, &opts(40, 15));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.token_count <= 40, "chunk over target: {}", c.token_count);
        }
    }

    #[test]
    fn test_overlap_carries_tail_sentences() {
        let text = numbered_sentences(20);
        let chunks = chunk_text(&text, 0, None, &opts(40, 15));
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let prev = split_sentences(&pair[0].text);
            let last = prev.last().unwrap();
            assert!(
                pair[1].text.starts_with(last),
                "chunk {:?} does not start with {:?}",
                pair[1].text,
                last
            );
        }
    }

    #[test]
    fn test_overlap_bounded_by_budget() {
        let text = numbered_sentences(20);
        // Ten-token sentences never fit a five-token overlap.
        let chunks = chunk_text(&text, 0, None, &opts(40, 5));
        for pair in chunks.windows(2) {
            let prev = split_sentences(&pair[0].text);
            let next = split_sentences(&pair[1].text);
            assert_ne!(prev.last(), next.first());
        }
    }

    #[test]
    fn test_zero_overlap() {
        let text = numbered_sentences(12);
        let chunks = chunk_text(&text, 0, None, &opts(40, 0));
        let total: usize = chunks.iter().map(|c| split_sentences(&c.text).len()).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn test_pages_numbered_from_one() {
        let content = SourceContent::Pages(vec![
            "The first page talks about caching layers.".to_string(),
            String::new(),
            "The third page talks about eviction policy.".to_string(),
        ]);
        let chunks = chunk_source(&content, 1, &ChunkerOptions::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_number, Some(1));
        assert_eq!(chunks[1].page_number, Some(3));
        assert!(chunks.iter().all(|c| c.source_index == 1));
    }

    #[test]
    fn test_deterministic_text() {
        let text = numbered_sentences(15);
        let a = chunk_text(&text, 0, None, &opts(40, 15));
        let b = chunk_text(&text, 0, None, &opts(40, 15));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.token_count, y.token_count);
        }
    }
}
