use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::semantic::cache::DEFAULT_CACHE_CAPACITY;
use crate::semantic::vectorizer::Analyzer;
use crate::semantic::DEFAULT_K;

/// Config file name inside the base directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default vector dimension (maximum vocabulary size)
const DEFAULT_DIMENSIONS: usize = 1024;
/// Default chunk size for file ingestion, in characters
const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between neighbouring chunks, in characters
const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Configuration for a knowledge store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Vector dimension D; also the vocabulary size cap
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// How documents are split into terms
    #[serde(default)]
    pub analyzer: Analyzer,

    /// Use 1 + ln(tf) instead of raw term counts
    #[serde(default)]
    pub sublinear_tf: bool,

    /// Maximum number of cached query results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Number of hits returned when the caller does not pass k
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Trim, lowercase and collapse whitespace before hashing cache keys
    #[serde(default = "default_true")]
    pub normalize_queries: bool,

    /// Drop cached results whenever the index changes
    #[serde(default = "default_true")]
    pub invalidate_cache_on_add: bool,

    /// Chunk size for file ingestion, in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            analyzer: Analyzer::default(),
            sublinear_tf: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            default_k: DEFAULT_K,
            normalize_queries: true,
            invalidate_cache_on_add: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_k() -> usize {
    DEFAULT_K
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::invalid("dimensions", "must be greater than 0"));
        }

        if u32::try_from(self.dimensions).is_err() {
            return Err(ConfigError::invalid(
                "dimensions",
                format!("must fit in 32 bits, got {}", self.dimensions),
            ));
        }

        self.analyzer
            .validate()
            .map_err(|message| ConfigError::invalid("analyzer", message))?;

        if self.cache_capacity == 0 {
            return Err(ConfigError::invalid("cache_capacity", "must be greater than 0"));
        }

        if self.default_k == 0 {
            return Err(ConfigError::invalid("default_k", "must be greater than 0"));
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size", "must be greater than 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::invalid(
                "chunk_overlap",
                format!(
                    "must be smaller than chunk_size ({}), got {}",
                    self.chunk_size, self.chunk_overlap
                ),
            ));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults if missing.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let path = base_path.join(CONFIG_FILE_NAME);

        // create new if does not exist
        if !path.exists() {
            let config = Self::default();
            config.save(base_path)?;
            return Ok(config);
        }

        let config_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Self = serde_yml::from_str(&config_str)?;

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            log::debug!("rewriting {} with current defaults", path.display());
            config.save(base_path)?;
        }

        Ok(config)
    }

    pub fn save(&self, base_path: &Path) -> Result<(), ConfigError> {
        let path = base_path.join(CONFIG_FILE_NAME);
        let config_str = serde_yml::to_string(self)?;

        std::fs::create_dir_all(base_path)
            .and_then(|_| std::fs::write(&path, config_str))
            .map_err(|source| ConfigError::Io { path, source })
    }
}
