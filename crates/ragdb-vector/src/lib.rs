//! ragdb-vector
//!
//! Per-collection embedding storage. `LanceVectorStore` persists chunks in a
//! LanceDB table with exact cosine search; `MemoryVectorStore` keeps them in
//! process for ephemeral collections and tests.
pub mod memory;
pub mod schema;
pub mod store;

pub use memory::{MemoryProvider, MemoryVectorStore};
pub use store::{LanceProvider, LanceVectorStore};
