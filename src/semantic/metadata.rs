//! Caller-supplied document metadata.
//!
//! Metadata is opaque to the index: it is stored next to each vector and
//! handed back with search hits. Values are restricted to integers, floats
//! and strings so every entry round-trips through the JSON encoding used by
//! snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Ordered mapping of metadata keys to values.
pub type Metadata = BTreeMap<String, MetadataValue>;

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(n) => Some(*n as f64),
            MetadataValue::Float(n) => Some(*n),
            MetadataValue::Text(_) => None,
        }
    }

    /// False for NaN and infinite floats, which JSON cannot encode.
    pub fn is_finite(&self) -> bool {
        match self {
            MetadataValue::Float(n) => n.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Integer(n) => write!(f, "{n}"),
            MetadataValue::Float(n) => write!(f, "{n}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

/// Name of the first key holding a value that cannot be persisted.
pub fn first_non_finite(metadata: &Metadata) -> Option<&str> {
    metadata
        .iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(key, _)| key.as_str())
}

/// Build a metadata map from `(key, value)` pairs.
pub fn metadata_from<I, K, V>(pairs: I) -> Metadata
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<MetadataValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_keeps_value_kinds() {
        let meta = metadata_from([
            ("path", MetadataValue::from("src/lib.rs")),
            ("line", MetadataValue::from(42i64)),
            ("score", MetadataValue::from(0.5f64)),
        ]);

        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();

        assert_eq!(back, meta);
        assert_eq!(back["line"].as_i64(), Some(42));
        assert_eq!(back["path"].as_str(), Some("src/lib.rs"));
    }

    #[test]
    fn test_display() {
        assert_eq!(MetadataValue::from("rust").to_string(), "rust");
        assert_eq!(MetadataValue::from(7i64).to_string(), "7");
    }

    #[test]
    fn test_usize_saturates() {
        assert_eq!(MetadataValue::from(usize::MAX).as_i64(), Some(i64::MAX));
        assert_eq!(MetadataValue::from(3usize).as_i64(), Some(3));
    }

    #[test]
    fn test_non_finite_floats() {
        let meta = metadata_from([
            ("ok", MetadataValue::from(1.5f64)),
            ("score", MetadataValue::from(f64::NAN)),
        ]);
        assert_eq!(first_non_finite(&meta), Some("score"));
        assert!(!MetadataValue::from(f64::INFINITY).is_finite());
        assert!(MetadataValue::from("nan").is_finite());
    }
}
