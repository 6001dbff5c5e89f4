use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub attachments: AttachmentConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default = "default_max_email_size")]
    pub max_email_size_bytes: usize,
    /// Minimum marketing-pattern matches before an email is classified as
    /// marketing. Tunable per corpus.
    #[serde(default = "default_marketing_threshold")]
    pub marketing_threshold: usize,
    /// Minimum notification-pattern matches (strict mode only).
    #[serde(default = "default_notification_threshold")]
    pub notification_threshold: usize,
    #[serde(default)]
    pub custom_blacklist: Vec<String>,
    #[serde(default)]
    pub custom_whitelist: Vec<String>,
    #[serde(default = "default_classification_cache_size")]
    pub cache_size: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_email_size_bytes: default_max_email_size(),
            marketing_threshold: default_marketing_threshold(),
            notification_threshold: default_notification_threshold(),
            custom_blacklist: Vec::new(),
            custom_whitelist: Vec::new(),
            cache_size: default_classification_cache_size(),
        }
    }
}

fn default_max_email_size() -> usize {
    10 * 1024 * 1024
}
fn default_marketing_threshold() -> usize {
    2
}
fn default_notification_threshold() -> usize {
    3
}
fn default_classification_cache_size() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    /// Cap on chunks per document; content beyond the cap is dropped so a
    /// single pathological email cannot trigger unbounded provider calls.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            max_chunks: default_max_chunks(),
        }
    }
}

fn default_max_tokens() -> usize {
    400
}
fn default_overlap() -> usize {
    50
}
fn default_max_chunks() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AttachmentConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_concurrent() -> usize {
    5
}
fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_cache_size")]
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            cache_size: default_embedding_cache_size(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_embedding_cache_size() -> usize {
    512
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate filter
    if config.filter.marketing_threshold == 0 {
        anyhow::bail!("filter.marketing_threshold must be >= 1");
    }
    if config.filter.notification_threshold == 0 {
        anyhow::bail!("filter.notification_threshold must be >= 1");
    }
    if config.filter.max_email_size_bytes == 0 {
        anyhow::bail!("filter.max_email_size_bytes must be > 0");
    }

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }
    if config.chunking.max_chunks == 0 {
        anyhow::bail!("chunking.max_chunks must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
