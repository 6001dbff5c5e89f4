//! Vectorize-once orchestration.
//!
//! [`VectorizationPipeline`] ties the stages together: combine email body
//! and attachment texts, clean, chunk, embed, persist. Each email is
//! embedded at most once (`is_vectorized` gates re-entry) and batches
//! tolerate per-email failures without aborting the rest.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{hash_text, CacheMetadata, EmbeddingCache};
use crate::chunker;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::EmbeddingProvider;
use crate::html::HtmlTextExtractor;
use crate::models::{
    AttachmentStats, BatchError, BatchOutcome, EmbeddingRecord, RawEmail, ScoredResult,
    VectorizationResult,
};
use crate::store::{EmailStore, SearchOptions};

/// Default emails per concurrent sub-batch during batch vectorization.
const DEFAULT_BATCH_SIZE: usize = 5;

/// One email plus the texts extracted from its attachments, ready for
/// vectorization.
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub email: RawEmail,
    pub attachment_texts: Vec<String>,
}

impl EmailContent {
    pub fn new(email: RawEmail) -> Self {
        Self {
            email,
            attachment_texts: Vec::new(),
        }
    }

    pub fn with_attachments(email: RawEmail, attachment_texts: Vec<String>) -> Self {
        Self {
            email,
            attachment_texts,
        }
    }
}

/// Result of a single vectorization attempt.
#[derive(Debug, Clone)]
pub enum VectorizeOutcome {
    /// The email already had a persisted embedding; nothing was done.
    AlreadyVectorized,
    /// A new embedding was computed (or reused from cache) and persisted.
    Vectorized(VectorizationResult),
}

/// Orchestrates cleaning, chunking, embedding, and persistence.
///
/// Cheap to clone; all shared state is behind `Arc`.
#[derive(Clone)]
pub struct VectorizationPipeline {
    store: Arc<dyn EmailStore>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    chunking: ChunkingConfig,
}

impl VectorizationPipeline {
    /// The cache is caller-constructed so tests and multi-pipeline setups
    /// can share or isolate it explicitly.
    pub fn new(
        store: Arc<dyn EmailStore>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            provider,
            cache,
            chunking: config.chunking.clone(),
        }
    }

    /// The best available plain text for an email: the plain body if present,
    /// otherwise text extracted from the HTML body.
    fn body_text(email: &RawEmail) -> String {
        if !email.body_text.trim().is_empty() {
            return email.body_text.clone();
        }
        if !email.body_html.trim().is_empty() {
            return HtmlTextExtractor::new().parse(&email.body_html).plain_text;
        }
        String::new()
    }

    /// Vectorize one email end to end.
    ///
    /// Skips (without error) emails that already have a persisted embedding.
    /// With `use_cache`, identical cleaned content reuses a prior embedding
    /// instead of calling the provider again.
    pub async fn vectorize_email(
        &self,
        content: &EmailContent,
        use_cache: bool,
    ) -> Result<VectorizeOutcome> {
        let email_id = content.email.external_id.clone();
        self.vectorize_inner(content, use_cache)
            .await
            .with_context(|| format!("Failed to vectorize email {}", email_id))
    }

    async fn vectorize_inner(
        &self,
        content: &EmailContent,
        use_cache: bool,
    ) -> Result<VectorizeOutcome> {
        let email_id = &content.email.external_id;

        if self.store.is_vectorized(email_id).await? {
            debug!(%email_id, "already vectorized, skipping");
            return Ok(VectorizeOutcome::AlreadyVectorized);
        }

        let body = Self::body_text(&content.email);
        let subject = content.email.subject.trim();
        let subject_and_body = if subject.is_empty() {
            body
        } else {
            format!("{subject}\n\n{body}")
        };
        let combined = chunker::combine_texts(&subject_and_body, &content.attachment_texts);
        let cleaned = chunker::clean(&combined);

        let chunks = chunker::chunk(&cleaned, &self.chunking);
        if chunks.is_empty() {
            bail!("Email has no extractable text");
        }

        let embedding = if use_cache {
            match self.cache.get(&cleaned) {
                Some(cached) => {
                    debug!(%email_id, "embedding cache hit");
                    cached.embedding
                }
                None => {
                    let record = self.embed_text(&cleaned).await?;
                    self.cache.set(
                        &cleaned,
                        record.clone(),
                        chunks.clone(),
                        self.cache_metadata(&cleaned),
                    );
                    record
                }
            }
        } else {
            self.embed_text(&cleaned).await?
        };

        let stats = AttachmentStats {
            has_attachments: content.email.has_attachments,
            attachment_count: content.attachment_texts.len(),
        };

        self.store
            .save_embedding(email_id, &embedding, &chunks, &stats)
            .await?;

        debug!(
            %email_id,
            chunks = chunks.len(),
            tokens = embedding.token_count,
            "email vectorized"
        );

        Ok(VectorizeOutcome::Vectorized(VectorizationResult {
            email_id: email_id.clone(),
            chunk_set: chunks,
            embedding,
            attachment_stats: stats,
        }))
    }

    fn cache_metadata(&self, cleaned: &str) -> CacheMetadata {
        CacheMetadata {
            model: self.provider.model_name().to_string(),
            word_count: cleaned.split_whitespace().count(),
        }
    }

    async fn embed_text(&self, cleaned: &str) -> Result<EmbeddingRecord> {
        let result = self.provider.embed(cleaned).await?;
        Ok(EmbeddingRecord {
            vector: result.vector,
            token_count: result.token_count,
            source_hash: hash_text(cleaned),
        })
    }

    /// Vectorize a batch of emails, tolerating per-email failures.
    ///
    /// Emails run in sub-batches of `batch_size` (default 5) concurrent
    /// tasks; a sub-batch completes before the next one starts. A failing
    /// email is recorded in the outcome's error list under its ID and the
    /// batch continues; `success` is true only when no email failed.
    pub async fn batch_vectorize_emails(
        &self,
        contents: Vec<EmailContent>,
        batch_size: Option<usize>,
    ) -> BatchOutcome {
        let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
        let mut outcome = BatchOutcome {
            success: true,
            ..Default::default()
        };

        for batch in contents.chunks(batch_size) {
            let mut tasks = JoinSet::new();
            for content in batch {
                let pipeline = self.clone();
                let content = content.clone();
                tasks.spawn(async move {
                    let email_id = content.email.external_id.clone();
                    let result = pipeline.vectorize_email(&content, true).await;
                    (email_id, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(_))) => outcome.processed_count += 1,
                    Ok((email_id, Err(e))) => {
                        warn!(%email_id, error = %e, "email vectorization failed");
                        outcome.error_count += 1;
                        outcome.errors.push(BatchError {
                            email_id,
                            error: format!("{e:#}"),
                        });
                    }
                    Err(join_err) => {
                        warn!(error = %join_err, "vectorization task panicked");
                        outcome.error_count += 1;
                        outcome.errors.push(BatchError {
                            email_id: String::new(),
                            error: join_err.to_string(),
                        });
                    }
                }
            }
        }

        outcome.success = outcome.error_count == 0;
        outcome
    }

    /// Vectorize a user's pending emails (body text only; attachment texts
    /// are supplied by the caller via [`batch_vectorize_emails`]).
    pub async fn vectorize_user_emails(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<BatchOutcome> {
        let emails = self
            .store
            .get_emails_for_vectorization(user_id, limit.unwrap_or(100))
            .await
            .with_context(|| format!("Failed to fetch emails for user {}", user_id))?;

        debug!(user_id, count = emails.len(), "vectorizing pending emails");
        let contents = emails.into_iter().map(EmailContent::new).collect();
        Ok(self.batch_vectorize_emails(contents, None).await)
    }

    /// Embed a query and search the store for similar emails.
    pub async fn search_similar_emails(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredResult>> {
        let cleaned = chunker::clean(query);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = match self.cache.get(&cleaned) {
            Some(cached) => cached.embedding,
            None => {
                let record = self.embed_text(&cleaned).await?;
                self.cache
                    .set(&cleaned, record.clone(), Vec::new(), self.cache_metadata(&cleaned));
                record
            }
        };

        self.store
            .search_similar(&embedding.vector, options)
            .await
            .context("Similarity search failed")
    }

    /// Embedding-cache statistics (size and hit count).
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}
