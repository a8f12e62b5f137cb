//! Lightweight configuration loader, typed engine settings, and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Engine settings live under the `engine` key and fall back to defaults field by
//! field. Provides helpers to expand `~` and `${VAR}` and to resolve relative
//! paths against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunker::ChunkingConfig;
use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Ok(Self::from_figment(Self::figment_for_env(&env_name)))
    }

    pub fn figment_for_env(env_name: &str) -> Figment {
        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed engine settings, validated. A missing `engine` table yields defaults.
    pub fn engine(&self) -> Result<EngineConfig, Error> {
        let config: EngineConfig = if self.figment.contains("engine") {
            self.figment
                .extract_inner("engine")
                .map_err(|e| Error::InvalidConfig(e.to_string()))?
        } else {
            EngineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub chunking: ChunkingConfig,
    pub lexical: LexicalConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub models: ModelConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.chunking.validate()?;
        let r = &self.retrieval;
        if r.top_f == 0 {
            return Err(Error::InvalidConfig("retrieval.top_f must be positive".into()));
        }
        if r.candidate_pool < r.top_f {
            return Err(Error::InvalidConfig(format!(
                "retrieval.candidate_pool ({}) must be at least top_f ({})",
                r.candidate_pool, r.top_f
            )));
        }
        if r.rrf_k.is_nan() || r.rrf_k <= 0.0 {
            return Err(Error::InvalidConfig("retrieval.rrf_k must be positive".into()));
        }
        if r.lexical_noise_floor < 0.0 {
            return Err(Error::InvalidConfig("retrieval.lexical_noise_floor must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&self.lexical.b) || self.lexical.k1 < 0.0 {
            return Err(Error::InvalidConfig("lexical.k1 must be >= 0 and lexical.b within [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.context.dedup_similarity) {
            return Err(Error::InvalidConfig("context.dedup_similarity must be within [0, 1]".into()));
        }
        if self.ingest.embed_batch_size == 0 || self.ingest.embed_attempts == 0 {
            return Err(Error::InvalidConfig("ingest.embed_batch_size and embed_attempts must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each collection lives under `<root>/collections/<id>/`.
    pub root_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root_dir: "~/.local/share/ragdb".to_string() }
    }
}

impl StorageConfig {
    pub fn root(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.root_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Upload size limit in bytes. 0 disables the limit.
    pub max_file_bytes: usize,
    /// Ready documents allowed per collection. 0 disables the limit.
    pub max_documents_per_collection: usize,
    pub embed_batch_size: usize,
    /// Total attempts per embedding batch before the document is failed.
    pub embed_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_documents_per_collection: 5,
            embed_batch_size: 32,
            embed_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl IngestConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// BM25 parameters and text analysis options for the lexical index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LexicalConfig {
    pub k1: f32,
    pub b: f32,
    pub stemming: bool,
    pub stop_words: bool,
    pub max_token_len: usize,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75, stemming: true, stop_words: true, max_token_len: 40 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates requested from each index and kept after fusion (N).
    pub candidate_pool: usize,
    /// Default number of final passages (F).
    pub top_f: usize,
    /// Reciprocal-rank-fusion damping constant.
    pub rrf_k: f32,
    /// Candidates whose BM25 score is below this are dropped before fusion,
    /// unless the lexical index returned nothing. 0 disables the filter.
    pub lexical_noise_floor: f32,
    pub query_embed_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_pool: 30,
            top_f: 6,
            rrf_k: 60.0,
            lexical_noise_floor: 0.0,
            query_embed_timeout_ms: 2_000,
            rerank_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl RetrievalConfig {
    pub fn query_embed_timeout(&self) -> Duration {
        Duration::from_millis(self.query_embed_timeout_ms)
    }

    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_millis(self.rerank_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    pub max_context_tokens: usize,
    /// Word-set Jaccard similarity at or above which two passages count as duplicates.
    pub dedup_similarity: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_context_tokens: 2_000, dedup_similarity: 0.85 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub embedder_dir: Option<String>,
    pub reranker_dir: Option<String>,
    pub use_fake_embeddings: bool,
    pub fake_dim: usize,
    pub max_len: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { embedder_dir: None, reranker_dir: None, use_fake_embeddings: false, fake_dim: 384, max_len: 256 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
