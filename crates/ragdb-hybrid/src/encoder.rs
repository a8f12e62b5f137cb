//! Runs the embedding model off the async executor.
//!
//! Passage embedding retries each batch with exponential backoff and gives up
//! after a bounded number of attempts. Query embedding is bounded by a
//! deadline instead; missing it is a degradation, not an error.

use std::sync::Arc;
use std::time::Duration;

use ragdb_core::config::IngestConfig;
use ragdb_core::error::IngestionError;
use ragdb_core::traits::Embedder;
use ragdb_core::types::Degradation;

async fn embed_blocking(embedder: &Arc<dyn Embedder>, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
    let embedder = Arc::clone(embedder);
    let expected = texts.len();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts)).await??;
    if vectors.len() != expected {
        anyhow::bail!("embedder returned {} vectors for {expected} inputs", vectors.len());
    }
    Ok(vectors)
}

fn check_dims(vectors: &[Vec<f32>], dim: usize) -> anyhow::Result<()> {
    match vectors.iter().find(|v| v.len() != dim) {
        Some(v) => anyhow::bail!("embedder returned dimension {}, expected {dim}", v.len()),
        None => Ok(()),
    }
}

/// Embed all passage texts in batches of `embed_batch_size`.
pub async fn embed_passages(
    embedder: &Arc<dyn Embedder>,
    texts: &[String],
    config: &IngestConfig,
) -> Result<Vec<Vec<f32>>, IngestionError> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(config.embed_batch_size.max(1)) {
        let mut backoff = config.retry_backoff();
        let mut attempt = 1;
        loop {
            let result = match embed_blocking(embedder, batch.to_vec()).await {
                Ok(vectors) => check_dims(&vectors, embedder.dim()).map(|()| vectors),
                Err(e) => Err(e),
            };
            match result {
                Ok(vectors) => {
                    out.extend(vectors);
                    break;
                }
                Err(e) if attempt >= config.embed_attempts => {
                    return Err(IngestionError::EncoderUnavailable { attempts: attempt, reason: e.to_string() });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "embedding batch failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
    Ok(out)
}

/// Embed a query within `deadline`. Dropping the returned future abandons the
/// wait; the worker thread finishes its current call and its result is discarded.
pub async fn embed_query(embedder: &Arc<dyn Embedder>, query: &str, deadline: Duration) -> Result<Vec<f32>, Degradation> {
    match tokio::time::timeout(deadline, embed_blocking(embedder, vec![query.to_string()])).await {
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "query embedding timed out, using lexical results only");
            Err(Degradation::EmbeddingTimeout)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "query embedding failed, using lexical results only");
            Err(Degradation::EmbeddingUnavailable(e.to_string()))
        }
        Ok(Ok(mut vectors)) => {
            let vector = vectors.pop().unwrap_or_default();
            if vector.len() != embedder.dim() {
                return Err(Degradation::EmbeddingUnavailable(format!(
                    "query vector has dimension {}, expected {}",
                    vector.len(),
                    embedder.dim()
                )));
            }
            Ok(vector)
        }
    }
}
