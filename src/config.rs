use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/knowledge_bases.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_min_fragment_chars")]
    pub min_fragment_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
            min_fragment_chars: default_min_fragment_chars(),
        }
    }
}

fn default_target_tokens() -> usize {
    400
}
fn default_overlap_tokens() -> usize {
    50
}
fn default_min_fragment_chars() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_context_candidates")]
    pub context_candidates: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_candidates: default_context_candidates(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

fn default_top_k() -> usize {
    8
}
fn default_context_candidates() -> usize {
    12
}
fn default_max_context_tokens() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_bytes() -> usize {
    5 * 1024 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.target_tokens == 0 {
            anyhow::bail!("chunking.target_tokens must be > 0");
        }
        if self.chunking.overlap_tokens >= self.chunking.target_tokens {
            anyhow::bail!(
                "chunking.overlap_tokens ({}) must be smaller than chunking.target_tokens ({})",
                self.chunking.overlap_tokens,
                self.chunking.target_tokens
            );
        }

        // Validate retrieval
        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.context_candidates < 1 {
            anyhow::bail!("retrieval.context_candidates must be >= 1");
        }
        if self.retrieval.max_context_tokens < 1 {
            anyhow::bail!("retrieval.max_context_tokens must be >= 1");
        }

        if self.fetch.max_bytes < 1 {
            anyhow::bail!("fetch.max_bytes must be >= 1");
        }

        Ok(())
    }
}
