//! Local semantic knowledge store.
//!
//! Index text documents with a TF-IDF vectorizer, search them by vector
//! distance and persist the whole store to a single binary file.
//!
//! ```no_run
//! use ks::{metadata_from, KnowledgeStore, StoreConfig};
//!
//! let store = KnowledgeStore::new(StoreConfig::default())?;
//! store.add_documents(
//!     &["def add(a,b): return a+b", "def sub(a,b): return a-b"],
//!     vec![metadata_from([("name", "add")]), metadata_from([("name", "sub")])],
//! )?;
//! let hits = store.search("addition function", 1)?;
//! # Ok::<(), ks::KnowledgeError>(())
//! ```

pub mod config;
pub mod error;
pub mod semantic;

pub use config::{ConfigError, StoreConfig};
pub use error::{KnowledgeError, Result};
pub use semantic::{metadata_from, KnowledgeStore, Metadata, MetadataValue, SearchHit};
