//! The Index Manager: the single writer to every collection's indexes.
//!
//! Ingestion runs Normalizer -> Chunker -> Embedding Encoder and then commits
//! the chunks to both indexes as one unit. Mutations on one collection are
//! serialized; different collections proceed independently. Queries run
//! concurrently with everything.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use walkdir::WalkDir;

use ragdb_core::chunker::Chunker;
use ragdb_core::config::EngineConfig;
use ragdb_core::error::{Error, IngestionError, Result};
use ragdb_core::normalize::Normalizer;
use ragdb_core::traits::{Embedder, OcrEngine, ProgressObserver, Reranker, VectorStoreProvider};
use ragdb_core::types::{
    Chunk, CollectionId, Document, DocumentId, DocumentStatus, IngestReport, IngestStage, ProgressEvent, RetrievalResult,
};
use ragdb_embed::{get_default_embedder, get_default_reranker};
use ragdb_vector::LanceProvider;

use crate::collection::{manifest_path, Collection, ConsistencyReport};
use crate::encoder::embed_passages;
use crate::manifest::Manifest;
use crate::retriever::HybridRetriever;

const COLLECTIONS_DIR: &str = "collections";

pub struct IndexManager {
    root: PathBuf,
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    retriever: HybridRetriever,
    chunker: Chunker,
    normalizer: Normalizer,
    provider: Arc<dyn VectorStoreProvider>,
    collections: Mutex<HashMap<CollectionId, Arc<Collection>>>,
    registry: RwLock<HashMap<DocumentId, CollectionId>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl IndexManager {
    pub fn open(
        root: impl Into<PathBuf>,
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        provider: Arc<dyn VectorStoreProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.into();
        let chunker = Chunker::new(config.chunking.clone())?;
        let retriever = HybridRetriever::new(Arc::clone(&embedder), reranker, config.retrieval.clone(), &config.context);
        let registry = scan_registry(&root.join(COLLECTIONS_DIR));
        tracing::info!(root = %root.display(), documents = registry.len(), embedder = embedder.model_id(), "index manager opened");
        Ok(Self {
            root,
            config,
            embedder,
            retriever,
            chunker,
            normalizer: Normalizer::new(),
            provider,
            collections: Mutex::new(HashMap::new()),
            registry: RwLock::new(registry),
            observer: None,
        })
    }

    /// Models from `config.models`, LanceDB storage under `config.storage`
    /// resolved against `base`.
    pub fn open_default(config: EngineConfig, base: &Path) -> Result<Self> {
        let root = config.storage.root(base);
        let embedder = get_default_embedder(&config.models)?;
        let reranker = get_default_reranker(&config.models);
        Self::open(root, config, embedder, reranker, Arc::new(LanceProvider))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.normalizer = Normalizer::new().with_ocr(ocr);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingest one uploaded file into `collection_id`.
    ///
    /// Per-document failures (limits, normalization, empty text, encoder
    /// exhaustion, a rolled-back index write) come back as a `failed` report
    /// and are recorded on the Document. `Err` is reserved for invalid input,
    /// duplicate ids, storage failures, and lost index consistency.
    pub async fn ingest(&self, collection_id: &str, document_id: &str, bytes: &[u8], filename: &str) -> Result<IngestReport> {
        validate_id("collection", collection_id)?;
        validate_id("document", document_id)?;
        let reservation = self.reserve(collection_id, document_id)?;
        let collection = self.collection(collection_id, true).await?.ok_or_else(|| not_found_collection(collection_id))?;
        let _mutation = collection.lock_mutations().await;
        collection.ensure_usable().await?;
        let manifest = collection.manifest().await;
        if manifest.document(document_id).is_some_and(Document::is_ready) {
            return Err(Error::DocumentExists(document_id.to_string()));
        }

        let mut doc = Document::new(document_id, collection_id, filename, bytes);
        doc.status = DocumentStatus::Processing;
        tracing::info!(collection = collection_id, document = document_id, filename, bytes = bytes.len(), "ingesting document");

        match self.process(&collection, &manifest, doc.clone(), bytes).await {
            Ok(ready) => {
                reservation.keep();
                self.notify(collection_id, document_id, IngestStage::Indexed);
                tracing::info!(collection = collection_id, document = document_id, chunks = ready.chunk_ids.len(), "document ready");
                Ok(IngestReport::from(&ready))
            }
            Err(Error::Ingestion(reason)) => {
                tracing::warn!(collection = collection_id, document = document_id, %reason, "document failed");
                doc.fail(reason.to_string());
                self.notify(collection_id, document_id, IngestStage::Failed { reason: reason.to_string() });
                collection.record_without_chunks(doc.clone()).await?;
                reservation.keep();
                Ok(IngestReport::from(&doc))
            }
            Err(e) => Err(e),
        }
    }

    /// Claim `document_id` for `collection_id` in the registry. An id owned by
    /// another collection is refused; a new claim is released again when the
    /// returned guard is dropped without being kept.
    fn reserve(&self, collection_id: &str, document_id: &str) -> Result<Reservation<'_>> {
        let mut registry = self.registry.write();
        match registry.get(document_id) {
            Some(owner) if owner != collection_id => Err(Error::DocumentExists(document_id.to_string())),
            Some(_) => Ok(Reservation { registry: &self.registry, document_id: None }),
            None => {
                registry.insert(document_id.to_string(), collection_id.to_string());
                Ok(Reservation { registry: &self.registry, document_id: Some(document_id.to_string()) })
            }
        }
    }

    async fn process(&self, collection: &Collection, manifest: &Manifest, doc: Document, bytes: &[u8]) -> Result<Document> {
        let limits = &self.config.ingest;
        if limits.max_file_bytes > 0 && bytes.len() > limits.max_file_bytes {
            return Err(IngestionError::TooLarge { size: bytes.len(), limit: limits.max_file_bytes }.into());
        }
        let max_docs = limits.max_documents_per_collection;
        if max_docs > 0 && manifest.ready_documents() >= max_docs {
            return Err(IngestionError::CollectionFull(max_docs).into());
        }

        let normalizer = self.normalizer.clone();
        let (owned, filename) = (bytes.to_vec(), doc.filename.clone());
        let text = tokio::task::spawn_blocking(move || normalizer.normalize(&owned, &filename))
            .await
            .map_err(|e| IngestionError::Normalization(e.to_string()))??;
        self.notify(collection.id(), &doc.id, IngestStage::Normalized { chars: text.chars().count() });

        let chunks: Vec<Chunk> = self.chunker.chunks(&doc.id, &text).collect();
        if chunks.is_empty() {
            return Err(IngestionError::EmptyDocument.into());
        }
        self.notify(collection.id(), &doc.id, IngestStage::Chunked { chunks: chunks.len() });

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_passages(&self.embedder, &texts, limits).await?;
        self.notify(collection.id(), &doc.id, IngestStage::Embedded { vectors: vectors.len() });

        collection.commit_ingest(doc, &chunks, vectors).await
    }

    /// Delete a document wherever it lives.
    pub async fn delete(&self, document_id: &str) -> Result<Document> {
        validate_id("document", document_id)?;
        let collection_id = self
            .registry
            .read()
            .get(document_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("document '{document_id}'")))?;
        self.delete_from(&collection_id, document_id).await
    }

    /// Remove all of a document's chunks from both indexes, then its record.
    pub async fn delete_from(&self, collection_id: &str, document_id: &str) -> Result<Document> {
        validate_id("document", document_id)?;
        let collection = self.collection(collection_id, false).await?.ok_or_else(|| not_found_collection(collection_id))?;
        let _mutation = collection.lock_mutations().await;
        collection.ensure_usable().await?;
        let doc = collection.commit_delete(document_id).await?;
        self.registry.write().remove(document_id);
        tracing::info!(collection = collection_id, document = document_id, chunks = doc.chunk_ids.len(), "document deleted");
        Ok(doc)
    }

    /// An unknown or empty collection yields an empty result, not an error.
    pub async fn retrieve(&self, collection_id: &str, query: &str, top_f: Option<usize>) -> Result<RetrievalResult> {
        match self.collection(collection_id, false).await? {
            Some(collection) => self.retriever.retrieve(&collection, query, top_f).await,
            None => Ok(RetrievalResult::empty()),
        }
    }

    pub async fn documents(&self, collection_id: &str) -> Result<Vec<Document>> {
        match self.collection(collection_id, false).await? {
            Some(collection) => Ok(collection.manifest().await.documents().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    pub async fn document(&self, document_id: &str) -> Result<Option<Document>> {
        let Some(collection_id) = self.registry.read().get(document_id).cloned() else {
            return Ok(None);
        };
        match self.collection(&collection_id, false).await? {
            Some(collection) => Ok(collection.manifest().await.document(document_id).cloned()),
            None => Ok(None),
        }
    }

    pub fn collection_ids(&self) -> Vec<CollectionId> {
        let Ok(entries) = std::fs::read_dir(self.root.join(COLLECTIONS_DIR)) else {
            return Vec::new();
        };
        let mut ids: Vec<CollectionId> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        ids.sort();
        ids
    }

    pub async fn consistency(&self, collection_id: &str) -> Result<ConsistencyReport> {
        let collection = self.collection(collection_id, false).await?.ok_or_else(|| not_found_collection(collection_id))?;
        collection.consistency().await
    }

    /// Delete a collection's files and forget its documents. This is also the
    /// way out of an unusable collection.
    pub async fn drop_collection(&self, collection_id: &str) -> Result<()> {
        let collection = self.collection(collection_id, false).await?.ok_or_else(|| not_found_collection(collection_id))?;
        let _mutation = collection.lock_mutations().await;
        collection.retire("collection was dropped").await;
        {
            let mut open = self.collections.lock().await;
            open.remove(collection_id);
            std::fs::remove_dir_all(collection.dir())
                .map_err(|e| anyhow::anyhow!("failed to remove {}: {e}", collection.dir().display()))?;
        }
        self.registry.write().retain(|_, owner| owner != collection_id);
        tracing::info!(collection = collection_id, "collection dropped");
        Ok(())
    }

    /// The open collection `id`, opening it on first use. Returns `None` when
    /// it does not exist and `create` is false.
    async fn collection(&self, id: &str, create: bool) -> Result<Option<Arc<Collection>>> {
        validate_id("collection", id)?;
        if let Some(c) = self.collections.lock().await.get(id) {
            return Ok(Some(Arc::clone(c)));
        }
        let dir = self.root.join(COLLECTIONS_DIR).join(id);
        if !create && !dir.exists() {
            return Ok(None);
        }
        // Opening reads the store, so other collections stay reachable meanwhile.
        // A racing open of the same id loses to whichever inserted first.
        let opened =
            Arc::new(Collection::open(id, &dir, self.provider.as_ref(), self.embedder.dim(), &self.config.lexical).await?);
        let mut open = self.collections.lock().await;
        Ok(Some(Arc::clone(open.entry(id.to_string()).or_insert(opened))))
    }

    fn notify(&self, collection_id: &str, document_id: &str, stage: IngestStage) {
        if let Some(observer) = &self.observer {
            observer.on_progress(&ProgressEvent {
                collection_id: collection_id.to_string(),
                document_id: document_id.to_string(),
                stage,
            });
        }
    }
}

/// A registry entry claimed by an ingest that has not recorded anything yet.
struct Reservation<'a> {
    registry: &'a RwLock<HashMap<DocumentId, CollectionId>>,
    document_id: Option<DocumentId>,
}

impl Reservation<'_> {
    /// The document was recorded; the registry entry stays.
    fn keep(mut self) {
        self.document_id = None;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.document_id.take() {
            self.registry.write().remove(&id);
        }
    }
}

/// Document id -> collection id for every document recorded on disk.
fn scan_registry(collections_dir: &Path) -> HashMap<DocumentId, CollectionId> {
    let mut registry = HashMap::new();
    if !collections_dir.exists() {
        return registry;
    }
    for entry in WalkDir::new(collections_dir).min_depth(2).max_depth(2).into_iter().filter_map(|e| e.ok()) {
        let Some(dir) = entry.path().parent() else { continue };
        if entry.path() != manifest_path(dir) {
            continue;
        }
        let Some(collection_id) = dir.file_name().and_then(|n| n.to_str()) else { continue };
        match Manifest::load(entry.path(), collection_id) {
            Ok(manifest) => {
                for doc in manifest.documents() {
                    registry.insert(doc.id.clone(), collection_id.to_string());
                }
            }
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable manifest"),
        }
    }
    registry
}

fn validate_id(kind: &str, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{kind} id '{id}' must be non-empty and use only [A-Za-z0-9_.-]")))
    }
}

fn not_found_collection(id: &str) -> Error {
    Error::NotFound(format!("collection '{id}'"))
}
