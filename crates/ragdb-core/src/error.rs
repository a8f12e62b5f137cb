use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Document '{0}' already exists")]
    DocumentExists(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(#[from] IngestionError),

    /// A mutation could not be rolled back; the collection's indexes may have diverged.
    #[error("Index consistency lost for collection '{collection}': {reason}")]
    IndexConsistency { collection: String, reason: String },

    #[error("Collection '{collection}' is unusable until re-ingested: {reason}")]
    CollectionUnusable { collection: String, reason: String },

    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Per-document ingestion failures. These end up on the Document's `failed`
/// status and never abort other documents or queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestionError {
    #[error("empty document")]
    EmptyDocument,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("collection limit reached: at most {0} documents per collection")]
    CollectionFull(usize),

    #[error("normalization failed: {0}")]
    Normalization(String),

    #[error("embedding model unavailable after {attempts} attempts: {reason}")]
    EncoderUnavailable { attempts: u32, reason: String },

    #[error("indexing failed: {0}")]
    Indexing(String),
}

pub type Result<T> = std::result::Result<T, Error>;
