//! Deterministic overlapping text chunker.
//!
//! Splits cleaned text into [`TextChunk`]s of at most `max_tokens` tokens,
//! where a token is a whitespace-delimited word, an approximation of the
//! embedding provider's tokenizer rather than an exact BPE count. Each subsequent
//! chunk starts `overlap_tokens` tokens before the previous chunk's end so
//! context survives chunk boundaries. Chunk offsets are byte positions into
//! the source text, so concatenating the non-overlapping spans reconstructs
//! it exactly (up to the configured chunk-count cap, beyond which content
//! is dropped).

use crate::config::ChunkingConfig;
use crate::html;
use crate::models::TextChunk;

/// Normalize text before chunking. Same rules the HTML extractor applies
/// to plain text.
pub fn clean(text: &str) -> String {
    html::clean_plain_text(text)
}

/// Byte spans of whitespace-delimited words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, idx));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Split text into overlapping chunks under the configured token budget.
///
/// Deterministic: identical input and config always produce identical
/// chunks, with contiguous indices starting at 0. Returns an empty vector
/// for text with no tokens.
pub fn chunk(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let max_tokens = config.max_tokens.max(1);
    // Progress requires strictly fewer overlap tokens than chunk tokens.
    let overlap = config.overlap_tokens.min(max_tokens - 1);

    let spans = word_spans(text);
    if spans.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start_word = 0usize;

    while start_word < spans.len() && chunks.len() < config.max_chunks {
        let end_word = (start_word + max_tokens).min(spans.len());
        let start_offset = spans[start_word].0;
        let end_offset = spans[end_word - 1].1;

        chunks.push(TextChunk {
            index: chunks.len(),
            content: text[start_offset..end_offset].to_string(),
            start_offset,
            end_offset,
        });

        if end_word == spans.len() {
            break;
        }
        start_word = end_word - overlap;
    }

    chunks
}

/// Concatenate the email body with attachment texts under section headers,
/// so embeddings capture the provenance of each span.
pub fn combine_texts(body_text: &str, attachment_texts: &[String]) -> String {
    let mut combined = format!("EMAIL CONTENT:\n{}", body_text.trim());
    for (i, text) in attachment_texts
        .iter()
        .filter(|t| !t.trim().is_empty())
        .enumerate()
    {
        combined.push_str(&format!("\n\nATTACHMENT {}:\n{}", i + 1, text.trim()));
    }
    combined
}
