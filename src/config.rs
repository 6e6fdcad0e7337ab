use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::retrieval::RetrievalMode;

/// Hard cap on retrieved chunks per query, matching the engine's context
/// budget. Larger values are clamped, not rejected.
pub const MAX_RETRIEVAL_K: usize = 20;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    /// Text model used for both casual chat and retrieval-augmented answers.
    #[serde(default = "default_chat_model")]
    pub chat: String,
    /// Vision model used to describe ingested images.
    #[serde(default = "default_vision_model")]
    pub vision: String,
    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_url")]
    pub url: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            chat: default_chat_model(),
            vision: default_vision_model(),
            url: default_ollama_url(),
        }
    }
}

fn default_chat_model() -> String {
    "qwen2.5:7b".to_string()
}
fn default_vision_model() -> String {
    "llama3.2-vision:latest".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Window sizes per format class. Tabular text gets larger windows with
/// more overlap (coarse rows), image descriptions a single wide window,
/// prose a moderate window.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_prose_size")]
    pub prose_chunk_size: usize,
    #[serde(default = "default_prose_overlap")]
    pub prose_overlap: usize,
    #[serde(default = "default_tabular_size")]
    pub tabular_chunk_size: usize,
    #[serde(default = "default_tabular_overlap")]
    pub tabular_overlap: usize,
    #[serde(default = "default_image_size")]
    pub image_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            prose_chunk_size: default_prose_size(),
            prose_overlap: default_prose_overlap(),
            tabular_chunk_size: default_tabular_size(),
            tabular_overlap: default_tabular_overlap(),
            image_chunk_size: default_image_size(),
        }
    }
}

fn default_prose_size() -> usize {
    1200
}
fn default_prose_overlap() -> usize {
    300
}
fn default_tabular_size() -> usize {
    2000
}
fn default_tabular_overlap() -> usize {
    400
}
fn default_image_size() -> usize {
    4000
}

/// Retrieval strategy and its parameters. Mutable at runtime through
/// [`crate::engine::Engine::configure_retrieval`], which rebuilds the
/// retrieval-augmented session.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub mode: RetrievalMode,
    /// Number of chunks to retrieve per query.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Candidate pool multiplier for diversity (MMR) mode: `fetch_k = k × this`.
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,
    /// Relevance/diversity trade-off for MMR mode. 1.0 = pure relevance,
    /// 0.0 = pure diversity.
    #[serde(default = "default_lambda")]
    pub lambda: f32,
    /// Minimum similarity score for threshold mode.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::default(),
            k: default_k(),
            fetch_multiplier: default_fetch_multiplier(),
            lambda: default_lambda(),
            score_threshold: default_score_threshold(),
        }
    }
}

impl RetrievalConfig {
    /// Effective chunk count after the [`MAX_RETRIEVAL_K`] clamp.
    pub fn effective_k(&self) -> usize {
        self.k.min(MAX_RETRIEVAL_K)
    }

    /// Candidate pool size for MMR mode.
    pub fn fetch_k(&self) -> usize {
        self.effective_k() * self.fetch_multiplier.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k < 1 {
            anyhow::bail!("retrieval.k must be >= 1");
        }
        if self.fetch_multiplier < 1 {
            anyhow::bail!("retrieval.fetch_multiplier must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            anyhow::bail!("retrieval.lambda must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            anyhow::bail!("retrieval.score_threshold must be in [0.0, 1.0]");
        }
        Ok(())
    }
}

fn default_k() -> usize {
    12
}
fn default_fetch_multiplier() -> usize {
    3
}
fn default_lambda() -> f32 {
    0.7
}
fn default_score_threshold() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL of the embedding server. Falls back to `models.url` when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the serialized vector index. Wholesale-replaced on
    /// rebuild, wholesale-deleted on clear.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("vectors/index")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if present; otherwise run on defaults so the CLI
/// works without any setup.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.prose_chunk_size == 0
        || config.chunking.tabular_chunk_size == 0
        || config.chunking.image_chunk_size == 0
    {
        anyhow::bail!("chunking window sizes must be > 0");
    }
    if config.chunking.prose_overlap >= config.chunking.prose_chunk_size {
        anyhow::bail!("chunking.prose_overlap must be smaller than prose_chunk_size");
    }
    if config.chunking.tabular_overlap >= config.chunking.tabular_chunk_size {
        anyhow::bail!("chunking.tabular_overlap must be smaller than tabular_chunk_size");
    }

    config.retrieval.validate()?;

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.retrieval.effective_k(), 12);
        assert_eq!(config.retrieval.fetch_k(), 36);
    }

    #[test]
    fn parses_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [models]
            chat = "llama3.1:70b"

            [retrieval]
            mode = "similarity"
            k = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.models.chat, "llama3.1:70b");
        assert_eq!(config.retrieval.mode, RetrievalMode::Similarity);
        assert_eq!(config.retrieval.k, 6);
        // Untouched sections keep their defaults
        assert_eq!(config.chunking.prose_chunk_size, 1200);
        assert_eq!(config.embedding.model, "nomic-embed-text");
    }

    #[test]
    fn k_is_clamped_not_rejected() {
        let config: Config = toml::from_str(
            r#"
            [retrieval]
            k = 50
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_ok());
        assert_eq!(config.retrieval.effective_k(), MAX_RETRIEVAL_K);
    }

    #[test]
    fn rejects_bad_lambda() {
        let config: Config = toml::from_str(
            r#"
            [retrieval]
            lambda = 1.5
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_overlap_at_least_window() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            prose_chunk_size = 100
            prose_overlap = 100
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }
}
