//! Local semantic search over text documents.
//!
//! Documents are turned into TF-IDF vectors and searched by exact squared
//! Euclidean distance. Everything runs in-process, nothing is fetched.
//!
//! # Architecture
//!
//! - `vectorizer`: TF-IDF with a vocabulary frozen after the first fit
//! - `index`: Flat in-memory vector index with exact k-nearest search
//! - `cache`: Bounded LRU of query results
//! - `engine`: Query path tying vectorizer, cache and index together
//! - `storage`: Binary snapshot I/O
//! - `preprocess`: Query normalization and file chunking
//! - `store`: The `KnowledgeStore` facade

pub mod cache;
pub mod engine;
pub mod index;
pub mod metadata;
pub mod preprocess;
pub mod storage;
pub mod store;
pub mod vectorizer;

pub use cache::{CacheStats, QueryCache};
pub use engine::{EngineStats, QueryEngine};
pub use index::{FlatIndex, IndexEntry, SearchHit};
pub use metadata::{metadata_from, Metadata, MetadataValue};
pub use storage::{StorageError, VectorStorage};
pub use store::KnowledgeStore;
pub use vectorizer::{Analyzer, TfIdfVectorizer};

/// Default number of hits returned by a search
pub const DEFAULT_K: usize = 5;

/// Snapshot file name inside the base directory
pub const STORE_FILE_NAME: &str = "store.bin";
