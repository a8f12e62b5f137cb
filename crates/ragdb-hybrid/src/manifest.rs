//! The document-to-chunk manifest of one collection.
//!
//! Holds every Document record (including failed ones, so their reason stays
//! visible) and the chunk records of ready documents. It drives `delete` and
//! supplies passage text, spans, and filenames at query time.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use ragdb_core::storage::{load_json, save_json};
use ragdb_core::types::{Chunk, ChunkId, Document, DocumentId, Span};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub document_id: DocumentId,
    pub ordinal: usize,
    pub text: String,
    pub token_count: usize,
    pub char_span: Span,
    pub token_span: Span,
    /// Insertion sequence number in the lexical index.
    pub seq: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub collection_id: String,
    documents: BTreeMap<DocumentId, Document>,
    chunks: HashMap<ChunkId, ChunkRecord>,
}

impl Manifest {
    pub fn new(collection_id: &str) -> Self {
        Self { collection_id: collection_id.to_string(), ..Self::default() }
    }

    pub fn load(path: &Path, collection_id: &str) -> Result<Self> {
        Ok(load_json(path)?.unwrap_or_else(|| Self::new(collection_id)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn ready_documents(&self) -> usize {
        self.documents.values().filter(|d| d.is_ready()).count()
    }

    pub fn chunk(&self, id: &str) -> Option<&ChunkRecord> {
        self.chunks.get(id)
    }

    pub fn chunk_ids(&self) -> HashSet<ChunkId> {
        self.chunks.keys().cloned().collect()
    }

    pub fn has_chunks(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Record a ready document with its chunks and their lexical sequence numbers.
    pub fn insert_ready(&mut self, mut doc: Document, chunks: &[Chunk], seqs: &[u64]) {
        self.remove_document(&doc.id);
        doc.chunk_ids = chunks.iter().map(|c| c.id.clone()).collect();
        for (chunk, &seq) in chunks.iter().zip(seqs) {
            self.chunks.insert(
                chunk.id.clone(),
                ChunkRecord {
                    document_id: chunk.document_id.clone(),
                    ordinal: chunk.ordinal,
                    text: chunk.text.clone(),
                    token_count: chunk.token_count,
                    char_span: chunk.char_span,
                    token_span: chunk.token_span,
                    seq,
                },
            );
        }
        self.documents.insert(doc.id.clone(), doc);
    }

    /// Record a document that has no chunks, e.g. a failed one.
    pub fn insert_without_chunks(&mut self, doc: Document) {
        self.remove_document(&doc.id);
        self.documents.insert(doc.id.clone(), doc);
    }

    /// Remove a document and all of its chunk records.
    pub fn remove_document(&mut self, id: &str) -> Option<Document> {
        let doc = self.documents.remove(id)?;
        for chunk_id in &doc.chunk_ids {
            self.chunks.remove(chunk_id);
        }
        Some(doc)
    }
}
