//! # Mailvec
//!
//! Email content filtering, multi-format text extraction, and vectorization
//! for semantic mail search.
//!
//! Mailvec takes raw email messages (with optional binary attachments),
//! decides which are worth retaining, normalizes their content into plain
//! text, and turns that text into embedding vectors that a storage backend
//! can index for similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌─────────────┐   ┌───────────┐
//! │ RawEmail + │──▶│ EmailFilter │──▶│ HTML / PDF / │──▶│ Chunker + │
//! │ attachments│   │ (keep/drop) │   │ DOCX extract │   │ Embedding │
//! └────────────┘   └─────────────┘   └─────────────┘   └─────┬─────┘
//!                                                            │
//!                                                            ▼
//!                                                      ┌───────────┐
//!                                                      │ EmailStore│
//!                                                      │ (trait)   │
//!                                                      └───────────┘
//! ```
//!
//! The crate is a library: ingestion (fetching mail), persistent storage,
//! and any HTTP surface are external collaborators behind the
//! [`store::EmailStore`] and [`embedding::EmbeddingProvider`] traits.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`patterns`] | Blacklist domains and regex classifiers |
//! | [`cache`] | Bounded LRU caches (verdicts, embeddings) |
//! | [`filter`] | Domain/content/size filtering |
//! | [`html`] | HTML-to-text conversion and cleanup |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`attachments`] | Attachment validation, routing, batching |
//! | [`chunker`] | Deterministic overlapping chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Storage abstraction + in-memory impl |
//! | [`pipeline`] | Vectorize-once orchestration and search |

pub mod attachments;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod filter;
pub mod html;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod store;
