//! Overlap-aware text chunker.
//!
//! Splits long extracted text into windows small enough for one summarization
//! call. Consecutive windows share exactly `overlap` characters so that a
//! sentence cut at one boundary is still seen whole by the next call.
//!
//! # Algorithm
//!
//! 1. If the text fits in `chunk_size` characters, return it unchanged.
//! 2. Otherwise take a window `[start, start + chunk_size)`.
//! 3. Pull the window end back to the nearest paragraph break, sentence end,
//!    newline or space found within a short lookback, so words and sentences
//!    are not severed. The lookback never lets the window shrink to the
//!    overlap or below, which guarantees forward progress.
//! 4. Start the next window `overlap` characters before the previous end.
//! 5. The final window runs to the end of the text and may be shorter.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text is never
//! split inside a code point.

use crate::error::{Result, VaultError};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Lookback for boundary snapping, as a fraction of `chunk_size`.
const LOOKBACK_DIVISOR: usize = 10;

/// Split `text` into overlapping windows of at most `chunk_size` characters.
///
/// # Errors
///
/// [`VaultError::Validation`] unless `chunk_size > overlap`.
pub fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(VaultError::Validation(format!(
            "chunk_size ({}) must be greater than overlap ({})",
            chunk_size, overlap
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let lookback = (chunk_size / LOOKBACK_DIVISOR).min(chunk_size - overlap - 1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let hard_end = start + chunk_size;
        if hard_end >= chars.len() {
            chunks.push(chars[start..].iter().collect());
            break;
        }
        let end = find_break(&chars, hard_end, lookback);
        chunks.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    Ok(chunks)
}

/// Rough token count for `text` (⌈chars / 4⌉).
///
/// Used for budgeting summarization calls; not a tokenizer.
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Best cut position at or before `hard_end`, searching back `lookback` chars.
///
/// Preference: paragraph break, sentence end, newline, whitespace, then the
/// hard end itself. The returned index is exclusive (the boundary character
/// stays in the current chunk).
fn find_break(chars: &[char], hard_end: usize, lookback: usize) -> usize {
    let floor = hard_end - lookback;
    let window = floor..hard_end;

    let paragraph = window
        .clone()
        .rev()
        .find(|&i| i > 0 && chars[i] == '\n' && chars[i - 1] == '\n');
    if let Some(i) = paragraph {
        return i + 1;
    }

    let sentence = window
        .clone()
        .rev()
        .find(|&i| matches!(chars[i], '.' | '!' | '?') && chars[i + 1].is_whitespace());
    if let Some(i) = sentence {
        return i + 1;
    }

    if let Some(i) = window.clone().rev().find(|&i| chars[i] == '\n') {
        return i + 1;
    }

    if let Some(i) = window.rev().find(|&i| chars[i].is_whitespace()) {
        return i + 1;
    }

    hard_end
}

/// How a document's text will be sent to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub estimated_tokens: usize,
    pub chunks: Vec<String>,
}

impl ChunkPlan {
    /// Single pass when the estimate fits `max_single_pass_tokens`, otherwise
    /// overlapping chunks.
    pub fn for_text(
        text: &str,
        max_single_pass_tokens: usize,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self> {
        let estimated_tokens = estimate_token_count(text);
        let chunks = if estimated_tokens <= max_single_pass_tokens {
            vec![text.to_string()]
        } else {
            split_into_chunks(text, chunk_size, overlap)?
        };
        Ok(Self {
            estimated_tokens,
            chunks,
        })
    }

    pub fn is_chunked(&self) -> bool {
        self.chunks.len() > 1
    }
}
