#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ragdb_core::chunker::ChunkingConfig;
use ragdb_core::config::{ContextConfig, EngineConfig, IngestConfig, RetrievalConfig};
use ragdb_core::traits::{Embedder, ProgressObserver, Reranker, VectorStore, VectorStoreProvider};
use ragdb_core::types::{ChunkId, ProgressEvent, SearchHit, VectorEntry};
use ragdb_embed::FakeEmbedder;
use ragdb_hybrid::IndexManager;
use ragdb_vector::{MemoryProvider, MemoryVectorStore};

pub fn test_config() -> EngineConfig {
    EngineConfig {
        chunking: ChunkingConfig { min_tokens: 5, max_tokens: 10, overlap_tokens: 2, boundary_tolerance: 3 },
        ingest: IngestConfig {
            max_file_bytes: 64 * 1024,
            max_documents_per_collection: 0,
            embed_batch_size: 4,
            embed_attempts: 2,
            retry_backoff_ms: 1,
        },
        retrieval: RetrievalConfig { candidate_pool: 10, top_f: 3, ..RetrievalConfig::default() },
        context: ContextConfig { max_context_tokens: 500, dedup_similarity: 0.85 },
        ..EngineConfig::default()
    }
}

pub fn fake() -> Arc<dyn Embedder> {
    Arc::new(FakeEmbedder::new(64))
}

pub fn memory_manager(root: &Path, config: EngineConfig, reranker: Option<Arc<dyn Reranker>>) -> IndexManager {
    IndexManager::open(root, config, fake(), reranker, Arc::new(MemoryProvider)).expect("manager")
}

pub const CATS: &str = "Cats are small domesticated carnivores. They sleep for most of the day and hunt at night. \
Many cats enjoy climbing tall furniture and watching birds from the window.";
pub const SOLAR: &str = "Solar panels convert sunlight into electricity using photovoltaic cells. \
Panel efficiency depends on temperature, angle, and the quality of the silicon.";
pub const ZEBRA: &str = "Zebras live on the African savanna in large herds. \
Their black and white stripes may confuse predators and biting flies.";

/// Maps text onto one of a few axes by keyword, so tests control which
/// passages the vector side prefers.
pub struct KeywordEmbedder {
    pub rules: Vec<(&'static str, usize)>,
    pub dim: usize,
}

impl Embedder for KeywordEmbedder {
    fn model_id(&self) -> &str {
        "keyword"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let axis = self.rules.iter().find(|(kw, _)| lower.contains(kw)).map_or(self.dim - 2, |(_, a)| *a);
                let mut v = vec![0.0; self.dim];
                v[axis] = 1.0;
                v[self.dim - 1] = 0.1;
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                v.into_iter().map(|x| x / norm).collect()
            })
            .collect())
    }
}

/// Fake embeddings that can be switched to fail or stall.
pub struct SwitchableEmbedder {
    inner: FakeEmbedder,
    pub fail: AtomicBool,
    pub stall: Mutex<Option<Duration>>,
}

impl SwitchableEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: FakeEmbedder::new(64), fail: AtomicBool::new(false), stall: Mutex::new(None) })
    }
}

impl Embedder for SwitchableEmbedder {
    fn model_id(&self) -> &str {
        "switchable"
    }

    fn dim(&self) -> usize {
        64
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let stall = *self.stall.lock();
        if let Some(d) = stall {
            std::thread::sleep(d);
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("model offline");
        }
        self.inner.embed_batch(texts)
    }
}

pub enum RerankBehavior {
    Keyword(&'static str),
    Constant(f32),
    Slow(Duration),
    Fail,
}

pub struct TestReranker(pub RerankBehavior);

impl Reranker for TestReranker {
    fn model_id(&self) -> &str {
        "test-reranker"
    }

    fn score(&self, _query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
        match &self.0 {
            RerankBehavior::Keyword(kw) => {
                Ok(passages.iter().map(|p| if p.to_lowercase().contains(kw) { 1.0 } else { 0.0 }).collect())
            }
            RerankBehavior::Constant(s) => Ok(vec![*s; passages.len()]),
            RerankBehavior::Slow(d) => {
                std::thread::sleep(*d);
                Ok(vec![0.0; passages.len()])
            }
            RerankBehavior::Fail => anyhow::bail!("cross-encoder crashed"),
        }
    }
}

/// A memory store whose add can fail halfway and whose remove can fail,
/// either before touching anything or after the first id.
pub struct FlakyStore {
    inner: MemoryVectorStore,
    pub fail_add: AtomicBool,
    pub fail_remove: AtomicBool,
    pub partial_remove: AtomicBool,
}

impl FlakyStore {
    pub fn new(dim: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryVectorStore::new(dim),
            fail_add: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            partial_remove: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn add(&self, entries: &[VectorEntry]) -> anyhow::Result<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            let half = entries.len() / 2;
            self.inner.add(&entries[..half.max(1)]).await?;
            anyhow::bail!("disk full");
        }
        self.inner.add(entries).await
    }

    async fn remove(&self, ids: &[ChunkId]) -> anyhow::Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            anyhow::bail!("io error");
        }
        if self.partial_remove.load(Ordering::SeqCst) {
            self.inner.remove(&ids[..ids.len().min(1)]).await?;
            anyhow::bail!("io error after first delete");
        }
        self.inner.remove(ids).await
    }

    async fn fetch(&self, ids: &[ChunkId]) -> anyhow::Result<Vec<VectorEntry>> {
        self.inner.fetch(ids).await
    }

    async fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<SearchHit>> {
        self.inner.search(query, k).await
    }

    async fn ids(&self) -> anyhow::Result<HashSet<ChunkId>> {
        self.inner.ids().await
    }
}

/// Always hands out the same store, so a test can flip its failure switches.
pub struct SharedProvider(pub Arc<FlakyStore>);

#[async_trait]
impl VectorStoreProvider for SharedProvider {
    async fn open(&self, _dir: &Path, _dim: usize) -> anyhow::Result<Arc<dyn VectorStore>> {
        Ok(self.0.clone())
    }
}

/// Memory stores that take `delay` to open for the collection named `slow`.
pub struct SlowOpenProvider {
    pub delay: Duration,
}

#[async_trait]
impl VectorStoreProvider for SlowOpenProvider {
    async fn open(&self, dir: &Path, dim: usize) -> anyhow::Result<Arc<dyn VectorStore>> {
        if dir.components().any(|c| c.as_os_str() == "slow") {
            tokio::time::sleep(self.delay).await;
        }
        MemoryProvider.open(dir, dim).await
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn reranker(behavior: RerankBehavior) -> Option<Arc<dyn Reranker>> {
    Some(Arc::new(TestReranker(behavior)))
}
