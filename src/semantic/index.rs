//! Flat in-memory vector index with squared-Euclidean k-NN search.
//!
//! Entries are kept in insertion order, which is also ascending id order.
//! Search is brute force: every stored vector is scored, the k smallest
//! distances are selected, and only those are sorted.

use std::cmp::Ordering;

use serde::Serialize;

use crate::semantic::metadata::Metadata;

/// An entry in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Sequential id assigned at insertion
    pub id: u64,
    /// The document vector
    pub vector: Vec<f32>,
    /// Caller-supplied metadata
    pub metadata: Metadata,
}

/// Search hit from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Id of the matching entry
    pub id: u64,
    /// Metadata of the matching entry
    pub metadata: Metadata,
    /// Squared Euclidean distance to the query (lower is closer)
    pub distance: f32,
}

/// Flat vector index.
///
/// Every stored vector has exactly `dimensions` components. Ids are
/// monotonically increasing and never reused, even after removal.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
    next_id: u64,
}

impl FlatIndex {
    /// Create a new empty index with the given dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimensions,
            next_id: 0,
        }
    }

    /// Get the expected vector dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id the next inserted vector will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Append vectors with their metadata.
    ///
    /// The whole batch is validated before anything is stored, so a failed
    /// call leaves the index exactly as it was. Returns the assigned ids.
    pub fn add(
        &mut self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<Metadata>,
    ) -> Result<Vec<u64>, IndexError> {
        if vectors.len() != metadata.len() {
            return Err(IndexError::LengthMismatch {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: bad.len(),
            });
        }

        self.entries.reserve(vectors.len());
        let mut ids = Vec::with_capacity(vectors.len());

        for (vector, metadata) in vectors.into_iter().zip(metadata) {
            let id = self.next_id;
            self.next_id += 1;
            self.entries.push(IndexEntry {
                id,
                vector,
                metadata,
            });
            ids.push(id);
        }

        Ok(ids)
    }

    /// Remove an entry by id. The id is never handed out again.
    pub fn remove(&mut self, id: u64) -> Option<IndexEntry> {
        let pos = self.position(id)?;
        Some(self.entries.remove(pos))
    }

    /// Get an entry by id.
    pub fn get(&self, id: u64) -> Option<&IndexEntry> {
        self.position(id).map(|pos| &self.entries[pos])
    }

    /// Iterate over all entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// Find the `k` entries closest to `query`.
    ///
    /// `k` larger than the index is clamped. Results are ordered by
    /// ascending distance, ties broken by lower id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let k = k.min(self.entries.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (Self::squared_l2(query, &entry.vector), pos))
            .collect();

        // positions follow id order, so comparing positions breaks ties by id
        let by_distance = |a: &(f32, usize), b: &(f32, usize)| -> Ordering {
            a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);

        Ok(scored
            .into_iter()
            .map(|(distance, pos)| {
                let entry = &self.entries[pos];
                SearchHit {
                    id: entry.id,
                    metadata: entry.metadata.clone(),
                    distance,
                }
            })
            .collect())
    }

    /// Restore entries from a snapshot.
    ///
    /// Entries must be in ascending id order and below `next_id`.
    pub(crate) fn from_parts(
        dimensions: usize,
        entries: Vec<IndexEntry>,
        next_id: u64,
    ) -> Result<Self, IndexError> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                got: bad.vector.len(),
            });
        }

        let ordered = entries.windows(2).all(|w| w[0].id < w[1].id);
        let below_next = entries.last().map_or(true, |e| e.id < next_id);
        if !ordered || !below_next {
            return Err(IndexError::CorruptIds);
        }

        Ok(Self {
            entries,
            dimensions,
            next_id,
        })
    }

    /// Clear all entries. Id assignment continues from where it was.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }

    /// Squared Euclidean distance between two vectors of equal length.
    fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Length mismatch: {vectors} vectors but {metadata} metadata entries")]
    LengthMismatch { vectors: usize, metadata: usize },

    #[error("Entry ids are out of order or exceed the id counter")]
    CorruptIds,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::metadata::metadata_from;

    fn meta(name: &str) -> Metadata {
        metadata_from([("name", name)])
    }

    fn index_with(vectors: &[[f32; 3]]) -> FlatIndex {
        let mut index = FlatIndex::new(3);
        let metadata = (0..vectors.len()).map(|i| meta(&format!("doc{i}"))).collect();
        index
            .add(vectors.iter().map(|v| v.to_vec()).collect(), metadata)
            .unwrap();
        index
    }

    #[test]
    fn test_new_index() {
        let index = FlatIndex::new(384);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.next_id(), 0);
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let mut index = FlatIndex::new(3);
        let ids = index
            .add(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]], vec![meta("a"), meta("b")])
            .unwrap();
        assert_eq!(ids, vec![0, 1]);

        let ids = index.add(vec![vec![0.0, 0.0, 1.0]], vec![meta("c")]).unwrap();
        assert_eq!(ids, vec![2]);

        let entry = index.get(1).unwrap();
        assert_eq!(entry.metadata, meta("b"));
        assert_eq!(entry.vector, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_add_dimension_mismatch_leaves_index_untouched() {
        let mut index = index_with(&[[1.0, 0.0, 0.0]]);

        let result = index.add(
            vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0, 0.0]],
            vec![meta("ok"), meta("bad")],
        );

        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch { expected: 3, got: 4 })
        ));
        assert_eq!(index.len(), 1);
        assert_eq!(index.next_id(), 1);
    }

    #[test]
    fn test_add_length_mismatch_leaves_index_untouched() {
        let mut index = index_with(&[[1.0, 0.0, 0.0]]);

        let result = index.add(
            vec![vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0], vec![1.0, 1.0, 0.0]],
            vec![meta("a"), meta("b")],
        );

        assert!(matches!(
            result,
            Err(IndexError::LengthMismatch { vectors: 3, metadata: 2 })
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = index_with(&[[5.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);

        let hits = index.search(&[0.0, 0.0, 0.0], 3).unwrap();

        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(hits[1].distance, 4.0);
        assert_eq!(hits[2].distance, 25.0);
    }

    #[test]
    fn test_search_ties_broken_by_lower_id() {
        let index = index_with(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);

        let hits = index.search(&[0.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 0);
        assert_eq!(hits[1].id, 1);
    }

    #[test]
    fn test_search_clamps_k() {
        let index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let hits = index.search(&[1.0, 0.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_with_limit() {
        let mut index = FlatIndex::new(3);
        for i in 0..10 {
            index
                .add(vec![vec![1.0, i as f32 * 0.1, 0.0]], vec![meta("x")])
                .unwrap();
        }

        let hits = index.search(&[1.0, 0.0, 0.0], 3).unwrap();

        assert_eq!(hits.len(), 3);
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_search_empty_index() {
        let index = FlatIndex::new(3);
        let hits = index.search(&[1.0, 2.0, 3.0], 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = index_with(&[[1.0, 0.0, 0.0]]);
        let result = index.search(&[1.0, 0.0], 1);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_remove_does_not_reuse_ids() {
        let mut index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);

        let removed = index.remove(1).unwrap();
        assert_eq!(removed.id, 1);
        assert!(index.get(1).is_none());
        assert!(index.remove(1).is_none());

        let ids = index.add(vec![vec![0.0, 0.0, 1.0]], vec![meta("c")]).unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_from_parts_rejects_unordered_ids() {
        let entries = vec![
            IndexEntry { id: 3, vector: vec![0.0; 3], metadata: meta("a") },
            IndexEntry { id: 1, vector: vec![0.0; 3], metadata: meta("b") },
        ];
        let result = FlatIndex::from_parts(3, entries, 4);
        assert!(matches!(result, Err(IndexError::CorruptIds)));
    }
}
