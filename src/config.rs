//! TOML configuration parsing.
//!
//! Every command reads one configuration file (`--config`, default
//! `./config/na.toml`). Only `[paths].vault_root` is required; every other
//! section falls back to defaults suited to a local vault with AI
//! summarization disabled.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::vault::VaultContext;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub sharing: SharingConfig,
    #[serde(default)]
    pub filesystem: FilesystemConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    pub vault_root: PathBuf,
    #[serde(default)]
    pub resources_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Estimated tokens below which a document is summarized in one call.
    #[serde(default = "default_max_single_pass_tokens")]
    pub max_single_pass_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            max_single_pass_tokens: default_max_single_pass_tokens(),
        }
    }
}

fn default_chunk_size() -> usize {
    8000
}
fn default_overlap() -> usize {
    500
}
fn default_max_single_pass_tokens() -> usize {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Where `process` writes its results and failed-items files.
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    /// Replace notes that already exist for a source document.
    #[serde(default)]
    pub overwrite_notes: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            results_dir: None,
            overwrite_notes: false,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
            model: None,
            endpoint: default_endpoint(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AiConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_ai_provider() -> String {
    "disabled".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SharingConfig {
    #[serde(default = "default_sharing_provider")]
    pub provider: String,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            provider: default_sharing_provider(),
        }
    }
}

impl SharingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_sharing_provider() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

impl Config {
    /// Defaults for a vault with no configuration file.
    pub fn minimal(vault_root: impl Into<PathBuf>) -> Self {
        Self {
            paths: PathsConfig {
                vault_root: vault_root.into(),
                resources_root: None,
            },
            chunking: ChunkingConfig::default(),
            queue: QueueConfig::default(),
            ai: AiConfig::default(),
            sharing: SharingConfig::default(),
            filesystem: FilesystemConfig::default(),
        }
    }

    /// The vault context described by `[paths]`.
    pub fn vault_context(&self) -> VaultContext {
        let ctx = VaultContext::new(&self.paths.vault_root);
        match &self.paths.resources_root {
            Some(resources) => ctx.with_resources_root(resources),
            None => ctx,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    // Validate queue
    if config.queue.concurrency == 0 {
        bail!("queue.concurrency must be >= 1");
    }

    // Validate AI
    match config.ai.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown AI provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.ai.is_enabled() && config.ai.model.is_none() {
        bail!(
            "ai.model must be specified when provider is '{}'",
            config.ai.provider
        );
    }

    // Validate sharing
    match config.sharing.provider.as_str() {
        "disabled" | "local" => {}
        other => bail!(
            "Unknown sharing provider: '{}'. Must be disabled or local.",
            other
        ),
    }

    Ok(())
}
