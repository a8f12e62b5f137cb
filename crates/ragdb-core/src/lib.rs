//! ragdb-core
//!
//! Shared domain types, error taxonomy, configuration, and the ingestion front half
//! (normalization and chunking) used by the text, vector, and hybrid crates.

pub mod chunker;
pub mod config;
pub mod error;
pub mod normalize;
pub mod storage;
pub mod traits;
pub mod types;

pub use error::{Error, IngestionError, Result};
