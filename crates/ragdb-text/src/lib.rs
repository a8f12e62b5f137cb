//! ragdb-text
//!
//! Lexical side of retrieval: a tantivy text analyzer feeding an in-memory
//! BM25 inverted index that persists as JSON next to the collection manifest.
pub mod analyzer;
pub mod index;

pub use analyzer::Analyzer;
pub use index::LexicalIndex;
