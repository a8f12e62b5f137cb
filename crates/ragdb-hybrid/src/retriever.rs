//! Query path: embed, search both indexes in parallel, fuse, rank, assemble.

use std::sync::Arc;

use ragdb_core::config::{ContextConfig, RetrievalConfig};
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{Embedder, Reranker};
use ragdb_core::types::{Degradation, RetrievalResult, RetrievedPassage, SearchHit};

use crate::collection::Collection;
use crate::context::ContextAssembler;
use crate::encoder::embed_query;
use crate::fusion::{fuse, FusionParams};
use crate::ranking::Ranking;

pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    ranking: Ranking,
    assembler: ContextAssembler,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
        context: &ContextConfig,
    ) -> Self {
        let ranking = Ranking::new(reranker, config.rerank_timeout());
        if !ranking.is_reranked() {
            tracing::info!("no re-ranker available, retrieval is fused-only");
        }
        Self { embedder, ranking, assembler: ContextAssembler::new(context), config }
    }

    pub fn ranking(&self) -> &Ranking {
        &self.ranking
    }

    /// Retrieve up to `top_f` passages (the configured default when `None`).
    /// Fails only when the collection is unusable, storage cannot be read, or
    /// the whole request exceeds its deadline.
    pub async fn retrieve(&self, collection: &Collection, query: &str, top_f: Option<usize>) -> Result<RetrievalResult> {
        let deadline = self.config.request_timeout();
        match tokio::time::timeout(deadline, self.run(collection, query, top_f)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(collection = collection.id(), deadline_ms = deadline.as_millis() as u64, "retrieval timed out");
                Err(Error::QueryTimeout(deadline))
            }
        }
    }

    async fn run(&self, collection: &Collection, query: &str, top_f: Option<usize>) -> Result<RetrievalResult> {
        collection.ensure_usable().await?;
        let top_f = top_f.unwrap_or(self.config.top_f);
        if top_f == 0 || query.trim().is_empty() {
            return Ok(RetrievalResult::empty());
        }
        let pool = self.config.candidate_pool.max(top_f);
        let mut degradations = Vec::new();

        let query_vector = match embed_query(&self.embedder, query, self.config.query_embed_timeout()).await {
            Ok(v) => Some(v),
            Err(d) => {
                degradations.push(d);
                None
            }
        };

        // Both searches run against the same index version.
        let (manifest, lexical_hits, vector_hits) = {
            let state = collection.read().await;
            if let Some(reason) = &state.unusable {
                return Err(Error::CollectionUnusable { collection: collection.id().to_string(), reason: reason.clone() });
            }
            if !state.manifest.has_chunks() {
                return Ok(RetrievalResult::empty());
            }
            let lexical = Arc::clone(&state.lexical);
            let owned_query = query.to_string();
            let lexical_search = tokio::task::spawn_blocking(move || lexical.search(&owned_query, pool));
            let vector_search = async {
                match &query_vector {
                    Some(v) => state.vectors.search(v, pool).await.map(Some),
                    None => Ok(None),
                }
            };
            let (lexical_hits, vector_hits) = tokio::join!(lexical_search, vector_search);
            let lexical_hits = lexical_hits.map_err(|e| Error::Storage(e.into()))?;
            let vector_hits: Vec<SearchHit> = match vector_hits {
                Ok(hits) => hits.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(collection = collection.id(), error = %e, "vector search failed, using lexical results only");
                    degradations.push(Degradation::VectorSearchFailed(e.to_string()));
                    Vec::new()
                }
            };
            (Arc::clone(&state.manifest), lexical_hits, vector_hits)
        };

        let params = FusionParams { k: self.config.rrf_k, noise_floor: self.config.lexical_noise_floor, limit: pool };
        let candidates = fuse(&lexical_hits, &vector_hits, params, |id| manifest.chunk(id).map(|c| c.seq));
        tracing::debug!(
            collection = collection.id(),
            lexical = lexical_hits.len(),
            vector = vector_hits.len(),
            fused = candidates.len(),
            "candidates fused"
        );

        let texts: Vec<String> = candidates
            .iter()
            .map(|c| manifest.chunk(&c.chunk_id).map(|r| r.text.clone()).unwrap_or_default())
            .collect();
        let selection = self.ranking.select(query, candidates, texts, top_f).await;
        degradations.extend(selection.degradation);

        let passages: Vec<RetrievedPassage> = selection
            .ranked
            .into_iter()
            .filter_map(|(candidate, rerank_score)| {
                let record = manifest.chunk(&candidate.chunk_id)?;
                let filename = manifest
                    .document(&record.document_id)
                    .map(|d| d.filename.clone())
                    .unwrap_or_default();
                Some(RetrievedPassage {
                    chunk_id: candidate.chunk_id,
                    document_id: record.document_id.clone(),
                    document_filename: filename,
                    text: record.text.clone(),
                    char_span: record.char_span,
                    lexical_score: candidate.lexical_score,
                    vector_score: candidate.vector_score,
                    fused_score: candidate.fused_score,
                    rerank_score,
                })
            })
            .collect();

        let context = self.assembler.assemble(&passages);
        Ok(RetrievalResult { passages, context, degraded: !degradations.is_empty(), degradations })
    }
}
