//! Token estimation.
//!
//! No real tokenizer is involved. The estimate is a word count scaled by a
//! sub-word inflation factor and rounded up. Callers may rely on it being
//! deterministic and monotonic in the amount of text, not on it matching
//! any particular model's tokenizer.

/// Sub-word inflation as a ratio: 13 tokens per 10 words (1.3 per word).
const INFLATION_NUM: usize = 13;
const INFLATION_DEN: usize = 10;

/// Estimate the token cost of `text`.
///
/// Empty or whitespace-only text costs zero tokens.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words * INFLATION_NUM).div_ceil(INFLATION_DEN)
}
