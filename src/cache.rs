//! Bounded, keyed caches with least-recently-used eviction.
//!
//! Two cache layers back the pipeline:
//! - [`ClassificationCache`] maps a `(sender, subject, body)` triple to a
//!   prior [`FilterVerdict`], so retried or duplicate batches skip the
//!   pattern scan.
//! - [`EmbeddingCache`] maps a hash of normalized text to a stored
//!   embedding and chunk set, so duplicate content never triggers a second
//!   provider call.
//!
//! Both caches store copies of cached values (never references into caller
//! state) and are safe to share across concurrent batch tasks; writes are
//! atomic per key with last-writer-wins semantics.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::models::{EmbeddingRecord, FilterVerdict, TextChunk};

/// Cache occupancy and hit counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub total_hits: u64,
}

/// HashMap + access-order queue LRU. Values are immutable once set; a
/// repeated `set` with the same key overwrites the entry.
struct LruInner<V> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
    capacity: usize,
    hits: u64,
}

impl<V: Clone> LruInner<V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
        }
    }

    fn get(&mut self, key: &str) -> Option<V> {
        let value = self.entries.get(key).cloned()?;
        self.touch(key);
        self.hits += 1;
        Some(value)
    }

    fn set(&mut self, key: String, value: V) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_front(key);
            while self.entries.len() > self.capacity {
                if let Some(evicted) = self.order.pop_back() {
                    self.entries.remove(&evicted);
                }
            }
        } else {
            self.touch(&key);
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_front(key.to_string());
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.hits = 0;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            total_hits: self.hits,
        }
    }
}

/// SHA-256 hex digest of a text, used as a content-addressed cache key.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hash_triple(sender: &str, subject: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update([0u8]);
    hasher.update(subject.as_bytes());
    hasher.update([0u8]);
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Bounded cache of prior filter verdicts keyed by the email triple.
pub struct ClassificationCache {
    inner: Mutex<LruInner<FilterVerdict>>,
}

impl ClassificationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner::new(capacity)),
        }
    }

    pub fn get(&self, sender: &str, subject: &str, body: &str) -> Option<FilterVerdict> {
        let key = hash_triple(sender, subject, body);
        self.inner.lock().unwrap().get(&key)
    }

    pub fn set(&self, sender: &str, subject: &str, body: &str, verdict: FilterVerdict) {
        let key = hash_triple(sender, subject, body);
        self.inner.lock().unwrap().set(key, verdict);
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats()
    }
}

/// Provenance recorded alongside a cached embedding. Only content- and
/// provider-derived facts belong here; the cache is content-addressed, so
/// per-email state would leak across emails sharing the same text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetadata {
    /// Model that produced the vector.
    pub model: String,
    /// Whitespace-token count of the source text.
    pub word_count: usize,
}

/// A cached embedding plus the chunk set and provenance it was derived from.
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub embedding: EmbeddingRecord,
    pub chunks: Vec<TextChunk>,
    pub metadata: CacheMetadata,
}

/// Content-addressed cache of embeddings keyed by normalized-text hash.
///
/// Keys are hashes of the cleaned text, not the raw input, so two emails
/// differing only in whitespace hit the same entry.
pub struct EmbeddingCache {
    inner: Mutex<LruInner<CachedEmbedding>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner::new(capacity)),
        }
    }

    pub fn get(&self, normalized_text: &str) -> Option<CachedEmbedding> {
        let key = hash_text(normalized_text);
        self.inner.lock().unwrap().get(&key)
    }

    pub fn set(
        &self,
        normalized_text: &str,
        embedding: EmbeddingRecord,
        chunks: Vec<TextChunk>,
        metadata: CacheMetadata,
    ) {
        let key = hash_text(normalized_text);
        self.inner.lock().unwrap().set(
            key,
            CachedEmbedding {
                embedding,
                chunks,
                metadata,
            },
        );
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str) -> EmbeddingRecord {
        EmbeddingRecord {
            vector: vec![0.1, 0.2],
            token_count: 2,
            source_hash: hash.to_string(),
        }
    }

    #[test]
    fn classification_cache_round_trip() {
        let cache = ClassificationCache::new(8);
        assert!(cache.get("a@b.com", "hi", "body").is_none());

        cache.set("a@b.com", "hi", "body", FilterVerdict::keep());
        let hit = cache.get("a@b.com", "hi", "body").unwrap();
        assert!(!hit.is_filtered);

        // Different body is a different key
        assert!(cache.get("a@b.com", "hi", "other").is_none());
        assert_eq!(cache.stats().total_hits, 1);
    }

    #[test]
    fn lru_evicts_oldest_entry() {
        let cache = EmbeddingCache::new(2);
        cache.set("one", record("h1"), vec![], CacheMetadata::default());
        cache.set("two", record("h2"), vec![], CacheMetadata::default());
        // Touch "one" so "two" becomes the eviction candidate
        assert!(cache.get("one").is_some());
        cache.set("three", record("h3"), vec![], CacheMetadata::default());

        assert!(cache.get("one").is_some());
        assert!(cache.get("two").is_none());
        assert!(cache.get("three").is_some());
        assert_eq!(cache.stats().size, 2);
    }

    #[test]
    fn set_with_same_key_overwrites() {
        let cache = EmbeddingCache::new(4);
        cache.set("text", record("old"), vec![], CacheMetadata::default());
        cache.set("text", record("new"), vec![], CacheMetadata::default());
        assert_eq!(cache.get("text").unwrap().embedding.source_hash, "new");
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn cached_metadata_round_trips() {
        let cache = EmbeddingCache::new(4);
        let meta = CacheMetadata {
            model: "text-embedding-3-small".to_string(),
            word_count: 12,
        };
        cache.set("text", record("h"), vec![], meta.clone());
        assert_eq!(cache.get("text").unwrap().metadata, meta);
    }

    #[test]
    fn clear_resets_size_and_hits() {
        let cache = ClassificationCache::new(4);
        cache.set("s", "j", "b", FilterVerdict::keep());
        cache.get("s", "j", "b");
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
