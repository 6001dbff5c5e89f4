//! Core data models used throughout Mailvec.
//!
//! These types represent the emails, verdicts, chunks, and batch results
//! that flow through the filtering and vectorization pipeline. Each stage
//! owns its output value and hands it by value to the next stage; caches
//! store copies, never references into caller state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw email produced by the external ingestion collaborator. Immutable input.
#[derive(Debug, Clone)]
pub struct RawEmail {
    pub external_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body_text: String,
    pub body_html: String,
    pub sent_at: DateTime<Utc>,
    pub has_attachments: bool,
}

/// A filter decision: keep or drop, with reason and confidence.
///
/// Pure value; never mutated after creation. Confidence is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterVerdict {
    pub is_filtered: bool,
    pub reason: Option<String>,
    pub confidence: f32,
}

impl FilterVerdict {
    /// A "keep" verdict with zero confidence (no rule matched).
    pub fn keep() -> Self {
        Self {
            is_filtered: false,
            reason: None,
            confidence: 0.0,
        }
    }

    pub fn filtered(reason: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_filtered: true,
            reason: Some(reason.into()),
            confidence,
        }
    }
}

/// A raw email plus its final filter verdict.
///
/// Created once per raw email; `processed_at` marks it as filtered and the
/// record is never re-filtered afterwards.
#[derive(Debug, Clone)]
pub struct FilteredEmail {
    pub email: RawEmail,
    pub is_filtered: bool,
    pub filter_reason: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Attachment metadata. The payload travels separately as a byte buffer.
#[derive(Debug, Clone)]
pub struct AttachmentInfo {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Text extracted from one attachment by a format-specific extractor.
#[derive(Debug, Clone)]
pub struct ParsedAttachment {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub extracted_text: String,
    pub attachment_id: String,
}

/// Structural metadata reported alongside HTML-extracted text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentMetadata {
    pub has_images: bool,
    pub has_links: bool,
    pub has_tables: bool,
    pub word_count: usize,
    pub encoding: String,
}

/// Output of HTML extraction, consumed by the chunker.
#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub plain_text: String,
    pub metadata: ContentMetadata,
}

/// A bounded slice of cleaned text sized for one embedding call.
///
/// Indices are contiguous starting at 0. Offsets are byte positions into
/// the cleaned source text; consecutive chunks may overlap by a configured
/// token window but never skip content.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: usize,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// An embedding vector plus provenance.
///
/// The vector dimensionality is fixed by the provider for the life of an
/// index; mixing dimensions is an invariant violation the store rejects.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub vector: Vec<f32>,
    pub token_count: usize,
    pub source_hash: String,
}

/// Attachment accounting persisted with each vectorized email.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentStats {
    pub has_attachments: bool,
    pub attachment_count: usize,
}

/// Everything persisted for one vectorized email. Written once; the email's
/// "already vectorized" flag is the lifecycle terminal state.
#[derive(Debug, Clone)]
pub struct VectorizationResult {
    pub email_id: String,
    pub chunk_set: Vec<TextChunk>,
    pub embedding: EmbeddingRecord,
    pub attachment_stats: AttachmentStats,
}

/// Per-email failure recorded during batch vectorization.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub email_id: String,
    pub error: String,
}

/// Partial-failure accounting for a vectorization batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub processed_count: usize,
    pub error_count: usize,
    pub errors: Vec<BatchError>,
    pub success: bool,
}

impl BatchOutcome {
    /// Fold another outcome into this one, preserving `success` semantics.
    pub fn merge(&mut self, other: BatchOutcome) {
        self.processed_count += other.processed_count;
        self.error_count += other.error_count;
        self.errors.extend(other.errors);
        self.success = self.error_count == 0;
    }
}

/// A similarity-search hit returned by the storage collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    pub email_id: String,
    pub score: f32,
    pub snippet: String,
}

/// Per-user filter configuration record.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FilterRule {
    pub domain_pattern: String,
    pub filter_type: FilterKind,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Blacklist,
    Whitelist,
}

/// Aggregate statistics over a set of filter results.
#[derive(Debug, Clone, Default)]
pub struct FilteringStats {
    pub total: usize,
    pub filtered: usize,
    pub kept: usize,
    pub filter_reasons: HashMap<String, usize>,
    pub filter_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_outcome_merge_tracks_success() {
        let mut a = BatchOutcome {
            processed_count: 3,
            error_count: 0,
            errors: vec![],
            success: true,
        };
        let b = BatchOutcome {
            processed_count: 1,
            error_count: 2,
            errors: vec![
                BatchError {
                    email_id: "e1".into(),
                    error: "boom".into(),
                },
                BatchError {
                    email_id: "e2".into(),
                    error: "boom".into(),
                },
            ],
            success: false,
        };
        a.merge(b);
        assert_eq!(a.processed_count, 4);
        assert_eq!(a.error_count, 2);
        assert!(!a.success);
        assert_eq!(a.errors.len(), 2);
    }

    #[test]
    fn filter_kind_deserializes_lowercase() {
        let rule: FilterRule =
            serde_json::from_str(r#"{"domain_pattern":"*.spam.io","filter_type":"blacklist"}"#)
                .unwrap();
        assert_eq!(rule.filter_type, FilterKind::Blacklist);
    }
}
