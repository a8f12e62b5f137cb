//! A collection's indexes and the atomic mutations applied to them.
//!
//! Mutations are serialized by `mutation` and applied under the `state` write
//! lock, so a reader holding the read lock always sees both indexes at the
//! same version. The lexical index and manifest are swapped copy-on-write;
//! the vector store is shared and undone explicitly when a later step fails.

use anyhow::anyhow;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

use ragdb_core::config::LexicalConfig;
use ragdb_core::error::{Error, IngestionError, Result};
use ragdb_core::traits::{VectorStore, VectorStoreProvider};
use ragdb_core::types::{Chunk, ChunkId, Document, DocumentStatus, VectorEntry};
use ragdb_text::LexicalIndex;

use crate::manifest::Manifest;

const MANIFEST_FILE: &str = "manifest.json";
const LEXICAL_FILE: &str = "lexical.json";
const VECTORS_DIR: &str = "vectors";

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

pub struct CollectionState {
    pub lexical: Arc<LexicalIndex>,
    pub manifest: Arc<Manifest>,
    pub vectors: Arc<dyn VectorStore>,
    pub version: u64,
    /// Set once the indexes may have diverged; cleared only by dropping the collection.
    pub unusable: Option<String>,
}

/// Chunk-id sets of the three stores, as reported by `IndexManager::consistency`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub collection_id: String,
    pub manifest: HashSet<ChunkId>,
    pub lexical: HashSet<ChunkId>,
    pub vectors: HashSet<ChunkId>,
    pub unusable: Option<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.unusable.is_none() && self.manifest == self.lexical && self.lexical == self.vectors
    }
}

enum PersistFailure {
    /// Nothing on disk changed.
    Clean(anyhow::Error),
    /// The lexical file was replaced and could not be restored.
    Diverged(anyhow::Error),
}

pub struct Collection {
    id: String,
    dir: PathBuf,
    mutation: Mutex<()>,
    state: RwLock<CollectionState>,
}

impl Collection {
    pub async fn open(
        id: &str,
        dir: &Path,
        provider: &dyn VectorStoreProvider,
        dim: usize,
        lexical_config: &LexicalConfig,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| anyhow!("failed to create {}: {e}", dir.display()))?;
        let manifest = Manifest::load(&dir.join(MANIFEST_FILE), id)?;
        let lexical = LexicalIndex::load(&dir.join(LEXICAL_FILE), lexical_config)?;
        let vectors = provider.open(&dir.join(VECTORS_DIR), dim).await?;

        let manifest_ids = manifest.chunk_ids();
        let lexical_ids = lexical.ids();
        let vector_ids = vectors.ids().await?;
        let unusable = if manifest_ids == lexical_ids && lexical_ids == vector_ids {
            None
        } else {
            let reason = format!(
                "stored indexes disagree (manifest {}, lexical {}, vectors {} chunks)",
                manifest_ids.len(),
                lexical_ids.len(),
                vector_ids.len()
            );
            tracing::error!(collection = id, %reason, "collection failed its consistency check");
            Some(reason)
        };
        tracing::info!(collection = id, documents = manifest.documents().count(), chunks = manifest_ids.len(), "collection opened");

        Ok(Self {
            id: id.to_string(),
            dir: dir.to_path_buf(),
            mutation: Mutex::new(()),
            state: RwLock::new(CollectionState {
                lexical: Arc::new(lexical),
                manifest: Arc::new(manifest),
                vectors,
                version: 0,
                unusable,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Held for the whole of an ingest or delete.
    pub async fn lock_mutations(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().await
    }

    /// A consistent view of both indexes for the duration of the guard.
    pub async fn read(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.state.read().await
    }

    pub async fn ensure_usable(&self) -> Result<()> {
        match &self.state.read().await.unusable {
            Some(reason) => Err(Error::CollectionUnusable { collection: self.id.clone(), reason: reason.clone() }),
            None => Ok(()),
        }
    }

    pub async fn manifest(&self) -> Arc<Manifest> {
        Arc::clone(&self.state.read().await.manifest)
    }

    pub async fn consistency(&self) -> Result<ConsistencyReport> {
        let state = self.state.read().await;
        Ok(ConsistencyReport {
            collection_id: self.id.clone(),
            manifest: state.manifest.chunk_ids(),
            lexical: state.lexical.ids(),
            vectors: state.vectors.ids().await?,
            unusable: state.unusable.clone(),
        })
    }

    /// Add a document's chunks to both indexes as one unit. An
    /// `Error::Ingestion(Indexing)` means everything was rolled back; an
    /// `Error::IndexConsistency` means the rollback itself failed.
    pub async fn commit_ingest(&self, mut doc: Document, chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Result<Document> {
        let mut state = self.state.write().await;
        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(c, vector)| VectorEntry {
                id: c.id.clone(),
                document_id: c.document_id.clone(),
                ordinal: c.ordinal,
                text: c.text.clone(),
                vector,
            })
            .collect();
        let ids: Vec<ChunkId> = entries.iter().map(|e| e.id.clone()).collect();

        if let Err(e) = state.vectors.add(&entries).await {
            tracing::warn!(collection = %self.id, document = %doc.id, error = %e, "vector add failed, rolling back");
            self.undo_add(&mut state, &ids).await?;
            return Err(IngestionError::Indexing(e.to_string()).into());
        }

        let mut lexical = (*state.lexical).clone();
        let seqs: Vec<u64> = chunks.iter().map(|c| lexical.add(&c.id, &c.text)).collect();
        doc.status = DocumentStatus::Ready;
        doc.error = None;
        let mut manifest = (*state.manifest).clone();
        manifest.insert_ready(doc.clone(), chunks, &seqs);

        let persisted = self.persist(&lexical, &manifest, &state.lexical);
        match persisted {
            Ok(()) => {}
            Err(PersistFailure::Clean(e)) => {
                tracing::warn!(collection = %self.id, document = %doc.id, error = %e, "persist failed, rolling back");
                self.undo_add(&mut state, &ids).await?;
                return Err(IngestionError::Indexing(e.to_string()).into());
            }
            Err(PersistFailure::Diverged(e)) => {
                self.undo_add(&mut state, &ids).await?;
                return Err(self.mark_unusable(&mut state, format!("lexical index file could not be restored: {e}")));
            }
        }

        state.lexical = Arc::new(lexical);
        state.manifest = Arc::new(manifest);
        state.version += 1;
        doc.chunk_ids = ids;
        Ok(doc)
    }

    /// Remove a document's chunks from both indexes and discard its record.
    pub async fn commit_delete(&self, document_id: &str) -> Result<Document> {
        let mut state = self.state.write().await;
        let Some(doc) = state.manifest.document(document_id).cloned() else {
            return Err(Error::NotFound(format!("document '{document_id}' in collection '{}'", self.id)));
        };
        let ids = doc.chunk_ids.clone();
        let snapshot = state.vectors.fetch(&ids).await?;

        if let Err(e) = state.vectors.remove(&ids).await {
            tracing::warn!(collection = %self.id, document = document_id, error = %e, "vector removal failed, restoring");
            self.undo_remove(&mut state, &ids, &snapshot).await?;
            return Err(Error::Storage(e));
        }

        let mut lexical = (*state.lexical).clone();
        for id in &ids {
            lexical.remove(id);
        }
        let mut manifest = (*state.manifest).clone();
        manifest.remove_document(document_id);

        let persisted = self.persist(&lexical, &manifest, &state.lexical);
        match persisted {
            Ok(()) => {}
            Err(PersistFailure::Clean(e)) => {
                self.undo_remove(&mut state, &ids, &snapshot).await?;
                return Err(Error::Storage(e));
            }
            Err(PersistFailure::Diverged(e)) => {
                self.undo_remove(&mut state, &ids, &snapshot).await?;
                return Err(self.mark_unusable(&mut state, format!("lexical index file could not be restored: {e}")));
            }
        }

        state.lexical = Arc::new(lexical);
        state.manifest = Arc::new(manifest);
        state.version += 1;
        Ok(doc)
    }

    /// Persist a document that ended without chunks (failed ingestion).
    pub async fn record_without_chunks(&self, doc: Document) -> Result<()> {
        let mut state = self.state.write().await;
        let mut manifest = (*state.manifest).clone();
        if manifest.document(&doc.id).is_some_and(Document::is_ready) {
            return Err(Error::DocumentExists(doc.id));
        }
        manifest.insert_without_chunks(doc);
        manifest.save(&self.dir.join(MANIFEST_FILE))?;
        state.manifest = Arc::new(manifest);
        state.version += 1;
        Ok(())
    }

    /// Refuse further use of this handle, e.g. after its files were removed.
    pub async fn retire(&self, reason: &str) {
        self.state.write().await.unusable = Some(reason.to_string());
    }

    fn persist(&self, lexical: &LexicalIndex, manifest: &Manifest, previous: &LexicalIndex) -> std::result::Result<(), PersistFailure> {
        let lexical_path = self.dir.join(LEXICAL_FILE);
        lexical.save(&lexical_path).map_err(PersistFailure::Clean)?;
        if let Err(e) = manifest.save(&self.dir.join(MANIFEST_FILE)) {
            return match previous.save(&lexical_path) {
                Ok(()) => Err(PersistFailure::Clean(e)),
                Err(restore) => Err(PersistFailure::Diverged(restore.context(e.to_string()))),
            };
        }
        Ok(())
    }

    async fn undo_add(&self, state: &mut CollectionState, ids: &[ChunkId]) -> Result<()> {
        if let Err(e) = state.vectors.remove(ids).await {
            return Err(self.mark_unusable(state, format!("could not roll back vector add: {e}")));
        }
        Ok(())
    }

    /// Re-add whichever snapshot entries are no longer stored. Surviving rows
    /// are left alone, so a removal that failed without deleting anything
    /// rolls back without touching the store.
    async fn undo_remove(
        &self,
        state: &mut CollectionState,
        ids: &[ChunkId],
        snapshot: &[VectorEntry],
    ) -> Result<()> {
        let restored = match state.vectors.fetch(ids).await {
            Ok(present) => {
                let present: HashSet<&str> = present.iter().map(|e| e.id.as_str()).collect();
                let missing: Vec<VectorEntry> =
                    snapshot.iter().filter(|e| !present.contains(e.id.as_str())).cloned().collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    tracing::debug!(collection = %self.id, restored = missing.len(), "re-adding removed vectors");
                    state.vectors.add(&missing).await
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            return Err(self.mark_unusable(state, format!("could not roll back vector removal: {e}")));
        }
        Ok(())
    }

    fn mark_unusable(&self, state: &mut CollectionState, reason: String) -> Error {
        tracing::error!(collection = %self.id, %reason, "index consistency lost, collection marked unusable");
        state.unusable = Some(reason.clone());
        Error::IndexConsistency { collection: self.id.clone(), reason }
    }
}
