//! Storage abstraction for vectorized emails.
//!
//! The [`EmailStore`] trait defines the persistence operations the
//! vectorization pipeline needs, enabling pluggable backends (database,
//! in-memory). Implementations must be `Send + Sync` to work with async
//! runtimes.
//!
//! [`InMemoryStore`] is the reference implementation used in tests:
//! `HashMap` and `Vec` behind `std::sync::RwLock`, with brute-force cosine
//! similarity for search.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{AttachmentStats, EmbeddingRecord, RawEmail, ScoredResult, TextChunk};

/// Options for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results.
    pub limit: usize,
    /// Minimum cosine similarity; hits below are dropped.
    pub threshold: f32,
    /// Restrict results to one user's emails.
    pub user_id: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.7,
            user_id: None,
        }
    }
}

/// Abstract storage backend for the vectorization pipeline.
///
/// `save_embedding` is the only write; an email for which it has succeeded
/// reports `is_vectorized = true` and is never re-embedded.
#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Whether the email already has a persisted embedding.
    async fn is_vectorized(&self, email_id: &str) -> Result<bool>;

    /// Persist the embedding, chunk set, and attachment accounting for an
    /// email, and mark it vectorized.
    async fn save_embedding(
        &self,
        email_id: &str,
        embedding: &EmbeddingRecord,
        chunks: &[TextChunk],
        stats: &AttachmentStats,
    ) -> Result<()>;

    /// Cosine similarity search over stored embeddings.
    async fn search_similar(
        &self,
        query_vec: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredResult>>;

    /// Fetch up to `limit` of a user's emails that are not yet vectorized.
    async fn get_emails_for_vectorization(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RawEmail>>;
}

struct StoredEmbedding {
    email_id: String,
    user_id: Option<String>,
    vector: Vec<f32>,
    snippet: String,
    token_count: usize,
    source_hash: String,
    attachment_stats: AttachmentStats,
}

/// In-memory store for tests and small deployments.
pub struct InMemoryStore {
    /// Pending emails keyed by owning user.
    pending: RwLock<HashMap<String, Vec<RawEmail>>>,
    embeddings: RwLock<Vec<StoredEmbedding>>,
    /// Dimensionality fixed by the first saved vector.
    dims: RwLock<Option<usize>>,
    save_calls: RwLock<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            embeddings: RwLock::new(Vec::new()),
            dims: RwLock::new(None),
            save_calls: RwLock::new(0),
        }
    }

    /// Queue an email for vectorization under a user.
    pub fn add_email(&self, user_id: &str, email: RawEmail) {
        let mut pending = self.pending.write().unwrap();
        pending.entry(user_id.to_string()).or_default().push(email);
    }

    /// Number of persisted embeddings.
    pub fn embedding_count(&self) -> usize {
        self.embeddings.read().unwrap().len()
    }

    /// Total `save_embedding` invocations, including rejected ones.
    pub fn save_call_count(&self) -> usize {
        *self.save_calls.read().unwrap()
    }

    /// Attachment accounting persisted for an email, if it is vectorized.
    pub fn attachment_stats(&self, email_id: &str) -> Option<AttachmentStats> {
        let embeddings = self.embeddings.read().unwrap();
        embeddings
            .iter()
            .find(|e| e.email_id == email_id)
            .map(|e| e.attachment_stats.clone())
    }

    /// Token count persisted for an email, if it is vectorized.
    pub fn token_count(&self, email_id: &str) -> Option<usize> {
        let embeddings = self.embeddings.read().unwrap();
        embeddings
            .iter()
            .find(|e| e.email_id == email_id)
            .map(|e| e.token_count)
    }

    /// Source-content hash persisted for an email, if it is vectorized.
    pub fn source_hash(&self, email_id: &str) -> Option<String> {
        let embeddings = self.embeddings.read().unwrap();
        embeddings
            .iter()
            .find(|e| e.email_id == email_id)
            .map(|e| e.source_hash.clone())
    }

    fn owner_of(&self, email_id: &str) -> Option<String> {
        let pending = self.pending.read().unwrap();
        for (user, emails) in pending.iter() {
            if emails.iter().any(|e| e.external_id == email_id) {
                return Some(user.clone());
            }
        }
        None
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailStore for InMemoryStore {
    async fn is_vectorized(&self, email_id: &str) -> Result<bool> {
        let embeddings = self.embeddings.read().unwrap();
        Ok(embeddings.iter().any(|e| e.email_id == email_id))
    }

    async fn save_embedding(
        &self,
        email_id: &str,
        embedding: &EmbeddingRecord,
        chunks: &[TextChunk],
        stats: &AttachmentStats,
    ) -> Result<()> {
        *self.save_calls.write().unwrap() += 1;

        if embedding.vector.is_empty() {
            bail!("Refusing to store empty embedding for email {}", email_id);
        }

        {
            let mut dims = self.dims.write().unwrap();
            match *dims {
                Some(d) if d != embedding.vector.len() => bail!(
                    "Embedding dimension mismatch: store holds {} dims, got {}",
                    d,
                    embedding.vector.len()
                ),
                Some(_) => {}
                None => *dims = Some(embedding.vector.len()),
            }
        }

        let user_id = self.owner_of(email_id);
        let snippet = chunks
            .first()
            .map(|c| c.content.chars().take(240).collect::<String>())
            .unwrap_or_default();

        let mut embeddings = self.embeddings.write().unwrap();
        embeddings.retain(|e| e.email_id != email_id);
        embeddings.push(StoredEmbedding {
            email_id: email_id.to_string(),
            user_id,
            vector: embedding.vector.clone(),
            snippet,
            token_count: embedding.token_count,
            source_hash: embedding.source_hash.clone(),
            attachment_stats: stats.clone(),
        });
        Ok(())
    }

    async fn search_similar(
        &self,
        query_vec: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredResult>> {
        let embeddings = self.embeddings.read().unwrap();
        let mut hits: Vec<ScoredResult> = embeddings
            .iter()
            .filter(|e| match &options.user_id {
                Some(uid) => e.user_id.as_deref() == Some(uid.as_str()),
                None => true,
            })
            .map(|e| ScoredResult {
                email_id: e.email_id.clone(),
                score: cosine_similarity(query_vec, &e.vector),
                snippet: e.snippet.clone(),
            })
            .filter(|r| r.score >= options.threshold)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(options.limit);
        Ok(hits)
    }

    async fn get_emails_for_vectorization(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RawEmail>> {
        let pending = self.pending.read().unwrap();
        let embeddings = self.embeddings.read().unwrap();
        let emails = pending
            .get(user_id)
            .map(|emails| {
                emails
                    .iter()
                    .filter(|e| !embeddings.iter().any(|s| s.email_id == e.external_id))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(emails)
    }
}
