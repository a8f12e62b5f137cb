use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use ragdb_core::traits::{VectorStore, VectorStoreProvider};
use ragdb_core::types::{ChunkId, SearchHit, SourceKind, VectorEntry};

#[derive(Default)]
struct Inner {
    next_seq: u64,
    entries: HashMap<ChunkId, (u64, VectorEntry)>,
}

/// Exhaustive cosine search over vectors held in memory. Nothing is persisted.
pub struct MemoryVectorStore {
    dim: usize,
    inner: RwLock<Inner>,
}

impl MemoryVectorStore {
    pub fn new(dim: usize) -> Self {
        Self { dim, inner: RwLock::new(Inner::default()) }
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(&self, entries: &[VectorEntry]) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dim) {
            return Err(anyhow!("vector for {} has dimension {}, expected {}", bad.id, bad.vector.len(), self.dim));
        }
        let mut inner = self.inner.write();
        for e in entries {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.insert(e.id.clone(), (seq, e.clone()));
        }
        Ok(())
    }

    async fn remove(&self, ids: &[ChunkId]) -> Result<()> {
        let mut inner = self.inner.write();
        for id in ids {
            inner.entries.remove(id);
        }
        Ok(())
    }

    async fn fetch(&self, ids: &[ChunkId]) -> Result<Vec<VectorEntry>> {
        let inner = self.inner.read();
        Ok(ids.iter().filter_map(|id| inner.entries.get(id).map(|(_, e)| e.clone())).collect())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dim {
            return Err(anyhow!("query has dimension {}, expected {}", query.len(), self.dim));
        }
        let inner = self.inner.read();
        let mut scored: Vec<(f32, u64, &ChunkId)> =
            inner.entries.iter().map(|(id, (seq, e))| (cosine(query, &e.vector), *seq, id)).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, _, id)| SearchHit { id: id.clone(), score, source: SourceKind::Vector })
            .collect())
    }

    async fn ids(&self) -> Result<HashSet<ChunkId>> {
        Ok(self.inner.read().entries.keys().cloned().collect())
    }
}

/// Hands out a fresh [`MemoryVectorStore`] per collection.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryProvider;

#[async_trait]
impl VectorStoreProvider for MemoryProvider {
    async fn open(&self, _dir: &Path, dim: usize) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(MemoryVectorStore::new(dim)))
    }
}
