//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to defaults. See
//! `config/recall.example.toml` for a fully commented file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use chat_recall_core::chunk::{CHUNK_OVERLAP, MAX_CHUNK_CHARS};
use chat_recall_core::context::DEFAULT_MAX_CONTEXT_TOKENS;
use chat_recall_core::index::{IndexOptions, DEFAULT_BATCH_SIZE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: MAX_CHUNK_CHARS,
            overlap_chars: CHUNK_OVERLAP,
        }
    }
}

fn default_max_chars() -> usize {
    MAX_CHUNK_CHARS
}
fn default_overlap_chars() -> usize {
    CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_index_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default)]
    pub rerank: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: default_n_results(),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            rerank: false,
        }
    }
}

fn default_n_results() -> usize {
    10
}
fn default_max_context_tokens() -> usize {
    DEFAULT_MAX_CONTEXT_TOKENS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    fn is_remote(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_model")]
    pub model: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model: default_reranker_model(),
        }
    }
}

fn default_reranker_model() -> String {
    "bge-reranker-base".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `ollama` or `claude`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Ollama base URL. Unused by `claude`.
    #[serde(default = "default_ollama_url")]
    pub url: String,
    /// Falls back to a per-backend default, see [`GenerationConfig::model_name`].
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_ollama_url(),
            model: None,
            timeout_secs: default_generation_timeout(),
        }
    }
}

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";

impl GenerationConfig {
    pub fn model_name(&self) -> &str {
        match (&self.model, self.backend.as_str()) {
            (Some(model), _) => model,
            (None, "claude") => DEFAULT_CLAUDE_MODEL,
            (None, _) => DEFAULT_OLLAMA_MODEL,
        }
    }

    /// Apply `OLLAMA_HOST`, and `OLLAMA_MODEL` or `CLAUDE_MODEL` for the
    /// selected backend. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(host) = get("OLLAMA_HOST") {
            self.url = host;
        }
        let model_var = match self.backend.as_str() {
            "claude" => "CLAUDE_MODEL",
            _ => "OLLAMA_MODEL",
        };
        if let Some(model) = get(model_var) {
            self.model = Some(model);
        }
    }
}

fn default_backend() -> String {
    "ollama".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_generation_timeout() -> u64 {
    120
}

impl Config {
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            max_chars: self.chunking.max_chars,
            overlap: self.chunking.overlap_chars,
            batch_size: self.indexing.batch_size,
        }
    }
}

/// Read, parse and validate a config file, then apply the generation
/// environment overrides (see [`GenerationConfig::apply_env`]).
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)?;
    config.generation.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!("chunking.overlap_chars must be smaller than chunking.max_chars");
    }
    if config.indexing.batch_size == 0 {
        bail!("indexing.batch_size must be > 0");
    }
    if config.retrieval.n_results < 1 {
        bail!("retrieval.n_results must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_remote() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.generation.backend.as_str() {
        "ollama" | "claude" => {}
        other => bail!(
            "Unknown generation backend: '{}'. Must be ollama or claude.",
            other
        ),
    }

    Ok(config)
}
