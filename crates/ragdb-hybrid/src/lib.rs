//! ragdb-hybrid
//!
//! Collection-scoped hybrid retrieval: the Index Manager keeps the BM25 and
//! vector indexes of each collection in step, and the retriever fuses their
//! rankings (RRF), optionally re-ranks, and assembles a cited context.
pub mod collection;
pub mod context;
pub mod encoder;
pub mod fusion;
pub mod manager;
pub mod manifest;
pub mod ranking;
pub mod retriever;

pub use collection::ConsistencyReport;
pub use context::ContextAssembler;
pub use manager::IndexManager;
pub use ranking::Ranking;
pub use retriever::HybridRetriever;
