use crate::config::ConfigError;
use crate::semantic::index::IndexError;
use crate::semantic::storage::StorageError;
use crate::semantic::vectorizer::VectorizerError;

/// Errors surfaced by the knowledge store.
///
/// Each kind maps to a distinct exit status so calling tooling can tell
/// "not initialized" from "bad input" from "corrupt file".
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("store has not been fitted yet, add documents first")]
    NotFitted,

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("length mismatch: {left} items vs {right} metadata entries")]
    LengthMismatch { left: usize, right: usize },

    #[error("snapshot error: {0}")]
    Serialization(StorageError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = KnowledgeError> = std::result::Result<T, E>;

impl KnowledgeError {
    /// Stable process exit status for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            KnowledgeError::Internal(_) => 1,
            KnowledgeError::InvalidInput(_) => 2,
            KnowledgeError::NotFitted => 3,
            KnowledgeError::DimensionMismatch { .. } => 4,
            KnowledgeError::LengthMismatch { .. } => 5,
            KnowledgeError::Serialization(_) => 6,
            KnowledgeError::Config(_) => 7,
        }
    }

    pub(crate) fn poisoned<E: std::fmt::Display>(err: E) -> Self {
        KnowledgeError::Internal(format!("Lock poisoned: {err}"))
    }
}

impl From<IndexError> for KnowledgeError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, got } => {
                KnowledgeError::DimensionMismatch { expected, got }
            }
            IndexError::LengthMismatch { vectors, metadata } => KnowledgeError::LengthMismatch {
                left: vectors,
                right: metadata,
            },
            IndexError::CorruptIds => KnowledgeError::Internal(err.to_string()),
        }
    }
}

impl From<VectorizerError> for KnowledgeError {
    fn from(err: VectorizerError) -> Self {
        match err {
            VectorizerError::NotFitted => KnowledgeError::NotFitted,
            VectorizerError::EmptyCorpus | VectorizerError::EmptyVocabulary => {
                KnowledgeError::InvalidInput(err.to_string())
            }
        }
    }
}

impl From<StorageError> for KnowledgeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DimensionMismatch { expected, got } => {
                KnowledgeError::DimensionMismatch { expected, got }
            }
            other => KnowledgeError::Serialization(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            KnowledgeError::Internal("x".into()),
            KnowledgeError::InvalidInput("x".into()),
            KnowledgeError::NotFitted,
            KnowledgeError::DimensionMismatch { expected: 1, got: 2 },
            KnowledgeError::LengthMismatch { left: 1, right: 2 },
            KnowledgeError::Serialization(StorageError::ChecksumMismatch),
            KnowledgeError::Config(ConfigError::Invalid {
                field: "dimensions".into(),
                message: "x".into(),
            }),
        ];

        let codes: HashSet<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_storage_dimension_mismatch_maps_to_dimension_mismatch() {
        let err: KnowledgeError = StorageError::DimensionMismatch { expected: 8, got: 4 }.into();
        assert!(matches!(err, KnowledgeError::DimensionMismatch { expected: 8, got: 4 }));

        let err: KnowledgeError = StorageError::ChecksumMismatch.into();
        assert!(matches!(err, KnowledgeError::Serialization(_)));
    }

    #[test]
    fn test_vectorizer_not_fitted_maps_to_not_fitted() {
        let err: KnowledgeError = VectorizerError::NotFitted.into();
        assert!(matches!(err, KnowledgeError::NotFitted));
    }
}
