//! Knowledge store facade.
//!
//! Provides the interface external callers use:
//! - `add_documents` fits the vectorizer on the first batch, then reuses
//!   the frozen vocabulary for every later batch
//! - `search` goes through the query engine and its cache
//! - `save`/`load` write and read binary snapshots
//! - `add_file` chunks a text file and indexes the chunks
//!
//! Thread-safe: share it behind an `Arc`.

use std::path::Path;

use crate::config::StoreConfig;
use crate::error::{KnowledgeError, Result};
use crate::semantic::cache::CacheStats;
use crate::semantic::engine::{EngineOptions, EngineState, EngineStats, QueryEngine};
use crate::semantic::index::{FlatIndex, IndexEntry, SearchHit};
use crate::semantic::metadata::{first_non_finite, Metadata, MetadataValue};
use crate::semantic::preprocess::split_text;
use crate::semantic::storage::VectorStorage;
use crate::semantic::vectorizer::TfIdfVectorizer;

/// Local semantic knowledge store.
pub struct KnowledgeStore {
    config: StoreConfig,
    engine: QueryEngine,
}

impl KnowledgeStore {
    /// Create an empty, unfitted store.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let options = EngineOptions {
            normalize_queries: config.normalize_queries,
            invalidate_cache_on_add: config.invalidate_cache_on_add,
        };
        let engine = QueryEngine::new(None, config.dimensions, config.cache_capacity, options);

        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Vector dimension D, fixed for the lifetime of the store.
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Whether the vocabulary has been fitted.
    ///
    /// Returns false if the state lock is poisoned.
    pub fn is_fitted(&self) -> bool {
        self.engine
            .read()
            .map(|state| state.vectorizer.is_some())
            .unwrap_or(false)
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.engine.read().map(|state| state.index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index documents with their metadata.
    ///
    /// The first call fits the vocabulary on `texts`; later calls only
    /// transform. Either every document is added or none is.
    pub fn add_documents<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
        metadata: Vec<Metadata>,
    ) -> Result<Vec<u64>> {
        if texts.len() != metadata.len() {
            return Err(KnowledgeError::LengthMismatch {
                left: texts.len(),
                right: metadata.len(),
            });
        }

        for (i, meta) in metadata.iter().enumerate() {
            if let Some(key) = first_non_finite(meta) {
                return Err(KnowledgeError::InvalidInput(format!(
                    "metadata {key:?} of document {i} is not a finite number"
                )));
            }
        }

        if texts.is_empty() && self.is_fitted() {
            return Ok(vec![]);
        }

        let ids = self
            .engine
            .fit_and_add(self.new_vectorizer(), texts, metadata)?;

        log::debug!("Added {} documents", ids.len());
        Ok(ids)
    }

    /// Read a text file, split it into chunks and index them.
    ///
    /// Each chunk gets `source`, `chunk` and `language` metadata.
    pub fn add_file(&self, path: &Path) -> Result<Vec<u64>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KnowledgeError::InvalidInput(format!("failed to read {}: {e}", path.display()))
        })?;

        let chunks = split_text(&content, self.config.chunk_size, self.config.chunk_overlap);
        if chunks.is_empty() {
            return Err(KnowledgeError::InvalidInput(format!(
                "{} contains no text",
                path.display()
            )));
        }

        let source = path.display().to_string();
        let language = language_tag(path);
        let metadata = (0..chunks.len())
            .map(|i| {
                Metadata::from([
                    ("source".to_string(), MetadataValue::from(source.as_str())),
                    ("chunk".to_string(), MetadataValue::from(i)),
                    ("language".to_string(), MetadataValue::from(language)),
                ])
            })
            .collect();

        log::info!("Indexing {} chunks from {}", chunks.len(), source);
        self.add_documents(&chunks, metadata)
    }

    /// Return up to `k` documents closest to `query`, nearest first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.engine.search(query, k)
    }

    /// `search` with the configured default k.
    pub fn search_default(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.search(query, self.config.default_k)
    }

    /// Remove a document by id. Returns false if no such document exists.
    pub fn remove(&self, id: u64) -> Result<bool> {
        self.engine.remove(id)
    }

    /// Copy of every index entry, in id order.
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.engine.read()?.index.iter().cloned().collect())
    }

    /// Write a snapshot of the vocabulary and index to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.engine.read()?;
        VectorStorage::new(path).save(state.vectorizer.as_ref(), &state.index)?;

        log::info!("Saved {} vectors to {}", state.index.len(), path.display());
        Ok(())
    }

    /// Replace the store contents with the snapshot at `path`.
    ///
    /// Fails with `DimensionMismatch` if the snapshot was written with a
    /// different D. The cache is cleared on success.
    pub fn load(&self, path: &Path) -> Result<()> {
        let snapshot = VectorStorage::new(path).load(self.config.dimensions)?;

        if let Some(vectorizer) = &snapshot.vectorizer {
            if vectorizer.analyzer() != self.config.analyzer {
                log::warn!(
                    "Snapshot {} was fitted with analyzer {:?}, keeping it over configured {:?}",
                    path.display(),
                    vectorizer.analyzer(),
                    self.config.analyzer
                );
            }
        }

        log::info!(
            "Loaded {} vectors from {}",
            snapshot.index.len(),
            path.display()
        );

        self.engine.replace(EngineState {
            vectorizer: snapshot.vectorizer,
            index: snapshot.index,
        })
    }

    /// Drop every cached query result. The index is untouched.
    pub fn clear_cache(&self) {
        self.engine.clear_cache();
    }

    pub fn cache_len(&self) -> usize {
        self.engine.cache_len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache_stats()
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Drop all documents and the fitted vocabulary, returning to `Unfitted`.
    pub fn reset(&self) -> Result<()> {
        self.engine.replace(EngineState {
            vectorizer: None,
            index: FlatIndex::new(self.config.dimensions),
        })
    }

    fn new_vectorizer(&self) -> TfIdfVectorizer {
        TfIdfVectorizer::new(
            self.config.analyzer,
            self.config.dimensions,
            self.config.sublinear_tf,
        )
    }
}

/// Language tag derived from a file extension.
fn language_tag(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts" | "tsx") => "typescript",
        Some("go") => "go",
        Some("java") => "java",
        Some("c" | "h") => "c",
        Some("cc" | "cpp" | "cxx" | "hpp") => "cpp",
        Some("rb") => "ruby",
        Some("sh" | "bash" | "zsh") => "shell",
        Some("md" | "markdown") => "markdown",
        Some("toml") => "toml",
        Some("yaml" | "yml") => "yaml",
        Some("json") => "json",
        Some("html" | "htm") => "html",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::metadata::metadata_from;
    use crate::semantic::vectorizer::Analyzer;
    use tempfile::TempDir;

    fn test_config() -> StoreConfig {
        StoreConfig {
            dimensions: 64,
            cache_capacity: 8,
            ..Default::default()
        }
    }

    fn meta(path: &str) -> Metadata {
        metadata_from([("path", path)])
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StoreConfig {
            dimensions: 0,
            ..Default::default()
        };
        assert!(matches!(KnowledgeStore::new(config), Err(KnowledgeError::Config(_))));
    }

    #[test]
    fn test_search_before_add_is_not_fitted() {
        let store = KnowledgeStore::new(test_config()).unwrap();
        assert!(!store.is_fitted());
        assert!(matches!(store.search("query", 5), Err(KnowledgeError::NotFitted)));
    }

    #[test]
    fn test_first_add_fits() {
        let store = KnowledgeStore::new(test_config()).unwrap();

        let ids = store
            .add_documents(&["fn alpha()", "fn beta()"], vec![meta("a.rs"), meta("b.rs")])
            .unwrap();

        assert_eq!(ids, vec![0, 1]);
        assert!(store.is_fitted());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_length_mismatch_rejected_before_fit() {
        let store = KnowledgeStore::new(test_config()).unwrap();

        let result = store.add_documents(&["one", "two"], vec![meta("a")]);

        assert!(matches!(result, Err(KnowledgeError::LengthMismatch { left: 2, right: 1 })));
        assert!(!store.is_fitted());
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_first_batch_is_invalid_input() {
        let store = KnowledgeStore::new(test_config()).unwrap();
        let texts: Vec<String> = vec![];

        let result = store.add_documents(&texts, vec![]);

        assert!(matches!(result, Err(KnowledgeError::InvalidInput(_))));
        assert!(!store.is_fitted());
    }

    #[test]
    fn test_failed_fit_leaves_store_unfitted() {
        let store = KnowledgeStore::new(StoreConfig {
            analyzer: Analyzer::Word,
            ..test_config()
        })
        .unwrap();

        // single-character tokens are dropped by the word analyzer
        let result = store.add_documents(&["a b", "c"], vec![meta("a"), meta("b")]);

        assert!(matches!(result, Err(KnowledgeError::InvalidInput(_))));
        assert!(!store.is_fitted());
        assert!(store.is_empty());
    }

    #[test]
    fn test_later_adds_keep_vocabulary() {
        let store = KnowledgeStore::new(StoreConfig {
            analyzer: Analyzer::Word,
            ..test_config()
        })
        .unwrap();
        store
            .add_documents(&["alpha beta", "gamma delta"], vec![meta("1"), meta("2")])
            .unwrap();

        // "omega" is unknown, so the new document vectorizes to zero
        store.add_documents(&["omega"], vec![meta("3")]).unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[2].vector.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_search_default_uses_configured_k() {
        let store = KnowledgeStore::new(StoreConfig {
            default_k: 2,
            ..test_config()
        })
        .unwrap();
        let texts = ["fn one()", "fn two()", "fn three()"];
        store
            .add_documents(&texts, vec![meta("1"), meta("2"), meta("3")])
            .unwrap();

        assert_eq!(store.search_default("fn").unwrap().len(), 2);
    }

    #[test]
    fn test_remove() {
        let store = KnowledgeStore::new(test_config()).unwrap();
        store
            .add_documents(&["fn one()", "fn two()"], vec![meta("1"), meta("2")])
            .unwrap();

        assert!(store.remove(0).unwrap());
        assert!(!store.remove(0).unwrap());

        let hits = store.search("fn one", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn test_remove_missing_id_keeps_cache() {
        let store = KnowledgeStore::new(test_config()).unwrap();
        store
            .add_documents(&["fn one()", "fn two()"], vec![meta("1"), meta("2")])
            .unwrap();
        store.search("fn one", 5).unwrap();

        assert!(!store.remove(7).unwrap());
        assert_eq!(store.cache_len(), 1);

        assert!(store.remove(1).unwrap());
        assert_eq!(store.cache_len(), 0);
    }

    #[test]
    fn test_non_finite_metadata_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.bin");
        let store = KnowledgeStore::new(test_config()).unwrap();

        for bad in [f64::NAN, f64::INFINITY] {
            let metadata = vec![meta("a.rs"), metadata_from([("score", bad)])];
            let result = store.add_documents(&["fn alpha()", "fn beta()"], metadata);
            assert!(matches!(result, Err(KnowledgeError::InvalidInput(_))));
        }
        assert!(!store.is_fitted());

        store
            .add_documents(&["fn alpha()"], vec![metadata_from([("score", 0.25)])])
            .unwrap();
        store.save(&path).unwrap();

        let loaded = KnowledgeStore::new(test_config()).unwrap();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.entries().unwrap()[0].metadata["score"].as_f64(), Some(0.25));
    }

    #[test]
    fn test_reset_returns_to_unfitted() {
        let store = KnowledgeStore::new(test_config()).unwrap();
        store.add_documents(&["fn one()"], vec![meta("1")]).unwrap();

        store.reset().unwrap();

        assert!(!store.is_fitted());
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_file_chunks_and_tags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("math.py");
        std::fs::write(
            &path,
            "def add(a, b):\n    return a + b\n\n\ndef sub(a, b):\n    return a - b\n",
        )
        .unwrap();

        let store = KnowledgeStore::new(StoreConfig {
            chunk_size: 32,
            chunk_overlap: 0,
            ..test_config()
        })
        .unwrap();

        let ids = store.add_file(&path).unwrap();

        assert_eq!(ids.len(), 2);
        let entries = store.entries().unwrap();
        assert_eq!(entries[0].metadata["language"].as_str(), Some("python"));
        assert_eq!(entries[1].metadata["chunk"].as_i64(), Some(1));
        assert_eq!(
            entries[0].metadata["source"].as_str(),
            Some(path.display().to_string().as_str())
        );
    }

    #[test]
    fn test_add_missing_file_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(test_config()).unwrap();

        let result = store.add_file(&dir.path().join("missing.rs"));
        assert!(matches!(result, Err(KnowledgeError::InvalidInput(_))));
    }

    #[test]
    fn test_language_tag() {
        assert_eq!(language_tag(Path::new("src/lib.rs")), "rust");
        assert_eq!(language_tag(Path::new("README.MD")), "markdown");
        assert_eq!(language_tag(Path::new("Makefile")), "text");
    }
}
