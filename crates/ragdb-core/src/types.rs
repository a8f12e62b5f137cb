//! Domain types shared by the lexical, vector, and hybrid engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChunkId = String;
pub type DocumentId = String;
pub type CollectionId = String;

/// Lifecycle of an ingested source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

/// One ingested source file. A Document exclusively owns its chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub collection_id: CollectionId,
    pub filename: String,
    pub ingested_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub error: Option<String>,
    /// blake3 hex digest of the uploaded bytes.
    pub content_hash: String,
    pub chunk_ids: Vec<ChunkId>,
}

impl Document {
    pub fn new(id: &str, collection_id: &str, filename: &str, source: &[u8]) -> Self {
        Self {
            id: id.to_string(),
            collection_id: collection_id.to_string(),
            filename: filename.to_string(),
            ingested_at: Utc::now(),
            status: DocumentStatus::Pending,
            error: None,
            content_hash: blake3::hash(source).to_hex().to_string(),
            chunk_ids: Vec::new(),
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = DocumentStatus::Failed;
        self.error = Some(reason.into());
        self.chunk_ids.clear();
    }

    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }
}

/// Half-open `[start, end)` range. Used both for byte offsets into the
/// normalized text and for token positions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlap(&self, other: &Span) -> usize {
        self.end.min(other.end).saturating_sub(self.start.max(other.start))
    }
}

/// A contiguous passage of a document's normalized text. Immutable once created.
///
/// - `char_span`: UTF-8 byte offsets into the normalized text, used for citations
/// - `token_span`: word-token positions, used to check the overlap invariant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub ordinal: usize,
    pub text: String,
    pub token_count: usize,
    pub char_span: Span,
    pub token_span: Span,
}

pub fn chunk_id(document_id: &str, ordinal: usize) -> ChunkId {
    format!("{document_id}:{ordinal}")
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Lexical,
}

/// The minimal surface returned by both indexes.
///
/// `id` matches `Chunk::id`. `score` is engine-specific but higher is always
/// better: BM25 for the lexical index, cosine similarity for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// A chunk embedding as held by the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub ordinal: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A non-fatal fallback taken while answering a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Degradation {
    EmbeddingUnavailable(String),
    EmbeddingTimeout,
    RerankerUnavailable,
    RerankerFailed(String),
    RerankerTimeout,
    /// The vector store could not be searched; lexical results only.
    VectorSearchFailed(String),
}

/// One passage of a retrieval result, annotated for citation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedPassage {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub document_filename: String,
    pub text: String,
    pub char_span: Span,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
    pub fused_score: f32,
    /// Present only when the re-ranker scored this passage.
    pub rerank_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// The `[n]` marker used in the assembled context, 1-based.
    pub marker: usize,
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub document_filename: String,
    pub char_span: Span,
}

/// Prompt fragment handed to the model-serving layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub citations: Vec<Citation>,
    pub token_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub passages: Vec<RetrievedPassage>,
    pub context: AssembledContext,
    pub degraded: bool,
    pub degradations: Vec<Degradation>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    pub error: Option<String>,
    pub chunks: usize,
}

impl From<&Document> for IngestReport {
    fn from(doc: &Document) -> Self {
        Self {
            document_id: doc.id.clone(),
            status: doc.status,
            error: doc.error.clone(),
            chunks: doc.chunk_ids.len(),
        }
    }
}

/// Ingestion milestones reported to a [`crate::traits::ProgressObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStage {
    Normalized { chars: usize },
    Chunked { chunks: usize },
    Embedded { vectors: usize },
    Indexed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub collection_id: CollectionId,
    pub document_id: DocumentId,
    pub stage: IngestStage,
}
