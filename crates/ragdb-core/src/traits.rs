use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{ChunkId, ProgressEvent, SearchHit, VectorEntry};

/// Maps passages (or queries) to fixed-dimension, L2-normalized vectors.
/// Must be deterministic for identical input and model version.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (e.g., `bert:all-MiniLM-L6-v2:d384`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Fine-grained (query, passage) relevance scorer. Higher is better; scores
/// are only comparable within one call.
pub trait Reranker: Send + Sync {
    fn model_id(&self) -> &str;
    fn score(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Text recognition for scanned PDFs without a text layer.
pub trait OcrEngine: Send + Sync {
    fn recognize_pdf(&self, bytes: &[u8]) -> anyhow::Result<String>;
}

/// Embeddings keyed by chunk id, searchable by cosine similarity.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, entries: &[VectorEntry]) -> anyhow::Result<()>;
    async fn remove(&self, ids: &[ChunkId]) -> anyhow::Result<()>;
    /// Read back stored entries, used to restore a removal that must be undone.
    async fn fetch(&self, ids: &[ChunkId]) -> anyhow::Result<Vec<VectorEntry>>;
    async fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<SearchHit>>;
    async fn ids(&self) -> anyhow::Result<HashSet<ChunkId>>;
}

/// Opens the per-collection vector store rooted at `dir`.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    async fn open(&self, dir: &Path, dim: usize) -> anyhow::Result<Arc<dyn VectorStore>>;
}

/// Notified at ingestion milestones. Correctness never depends on an observer.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}
