//! ragdb-embed
//!
//! Local model inference with candle: a BERT sentence embedder, a BERT
//! cross-encoder re-ranker, and a hashed fake embedder for development.
pub mod bert;
pub mod cross_encoder;
pub mod device;
pub mod fake;
pub mod pool;
pub mod tokenize;

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;

use ragdb_core::config::{expand_path, ModelConfig};
use ragdb_core::traits::{Embedder, Reranker};

pub use bert::BertEmbedder;
pub use cross_encoder::CrossEncoder;
pub use fake::FakeEmbedder;
pub use pool::masked_mean_l2;

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// The fake embedder when `APP_USE_FAKE_EMBEDDINGS` or
/// `models.use_fake_embeddings` is set, otherwise the BERT model found via
/// `models.embedder_dir`, `APP_MODEL_DIR`, or `models/all-MiniLM-L6-v2`.
pub fn get_default_embedder(config: &ModelConfig) -> Result<Arc<dyn Embedder>> {
    if config.use_fake_embeddings || env_flag("APP_USE_FAKE_EMBEDDINGS") {
        tracing::info!(dim = config.fake_dim, "using fake embedder");
        return Ok(Arc::new(FakeEmbedder::new(config.fake_dim)));
    }
    let dir = resolve_embedder_dir(config)?;
    Ok(Arc::new(BertEmbedder::load(&dir, config.max_len)?))
}

/// The cross-encoder from `models.reranker_dir`, or `None` if none is
/// configured or it fails to load.
pub fn get_default_reranker(config: &ModelConfig) -> Option<Arc<dyn Reranker>> {
    let dir = expand_path(config.reranker_dir.as_deref()?);
    match CrossEncoder::load(&dir, config.max_len) {
        Ok(model) => Some(Arc::new(model)),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "re-ranker unavailable, results will be fused-only");
            None
        }
    }
}

fn resolve_embedder_dir(config: &ModelConfig) -> Result<PathBuf> {
    let candidates = config
        .embedder_dir
        .iter()
        .cloned()
        .chain(std::env::var("APP_MODEL_DIR").ok())
        .chain(std::iter::once("models/all-MiniLM-L6-v2".to_string()));
    for candidate in candidates {
        let p = expand_path(&candidate);
        if p.exists() {
            tracing::debug!(dir = %p.display(), "using embedding model dir");
            return Ok(p);
        }
    }
    Err(anyhow!("could not locate an embedding model directory"))
}
