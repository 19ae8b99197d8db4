//! In-memory embedding table with cosine similarity search.
//!
//! Holds the precomputed review embeddings and ranks them against a query
//! vector by linear scan.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::arithmetic::l2_norm;

/// A precomputed review embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Review id
    pub id: u64,
    #[serde(default, alias = "name")]
    pub label: String,
    pub vector: Vec<f32>,
}

/// One ranked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: u64,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot search with zero-norm vector")]
    ZeroNormVector,

    #[error("failed to read embeddings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("embeddings file is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("embedding table is empty")]
    Empty,
}

/// Precomputed embeddings held in memory.
pub struct EmbeddingTable {
    records: Vec<EmbeddingRecord>,
    /// L2 norms, parallel to `records`
    norms: Vec<f32>,
    dimensions: usize,
}

impl EmbeddingTable {
    /// Load `[{ "id": 0, "name": "...", "vector": [...] }, ...]` from disk.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let raw = std::fs::read(path).map_err(|source| IndexError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let records: Vec<EmbeddingRecord> = serde_json::from_slice(&raw)?;

        let table = Self::new(records)?;
        log::info!(
            "loaded {} embeddings ({} dimensions) from {}",
            table.len(),
            table.dimensions,
            path.display()
        );
        Ok(table)
    }

    /// Build a table; every record must share the first record's dimension.
    pub fn new(records: Vec<EmbeddingRecord>) -> Result<Self, IndexError> {
        let dimensions = records
            .first()
            .map(|r| r.vector.len())
            .ok_or(IndexError::Empty)?;

        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                got: bad.vector.len(),
            });
        }

        let norms = records.iter().map(|r| l2_norm(&r.vector)).collect();

        Ok(Self {
            records,
            norms,
            dimensions,
        })
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of entries in the table.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Rank every record against `query` by cosine similarity.
    ///
    /// Records with a zero-norm vector are excluded, as are non-finite
    /// scores. Scores below `threshold` are dropped before sorting.
    ///
    /// # Returns
    /// At most `limit` results sorted by similarity (highest first).
    pub fn search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredMatch>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<ScoredMatch> = self
            .records
            .par_iter()
            .zip(self.norms.par_iter())
            .filter_map(|(record, norm)| {
                let similarity = cosine(query, query_norm, &record.vector, *norm)?;
                (similarity >= threshold).then_some(ScoredMatch {
                    id: record.id,
                    similarity,
                })
            })
            .collect();

        sort_by_similarity(&mut results);
        results.truncate(limit);

        Ok(results)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `dot(a, b) / (|a| * |b|)` from precomputed norms. `None` when either
/// vector has zero magnitude or the score is not finite.
pub(crate) fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> Option<f32> {
    if a_norm < f32::EPSILON || b_norm < f32::EPSILON {
        return None;
    }
    let similarity = dot(a, b) / (a_norm * b_norm);
    similarity.is_finite().then_some(similarity)
}

/// Sort descending by similarity; ties keep ascending id order.
pub fn sort_by_similarity(matches: &mut [ScoredMatch]) {
    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::io::Write;

    fn is_sorted_desc(matches: &[ScoredMatch]) -> bool {
        matches
            .windows(2)
            .all(|w| w[0].similarity.partial_cmp(&w[1].similarity) != Some(Ordering::Less))
    }

    fn record(id: u64, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id,
            label: format!("coffee {id}"),
            vector,
        }
    }

    #[test]
    fn test_search_basic() {
        let table = EmbeddingTable::new(vec![
            record(1, vec![1.0, 0.0, 0.0]),
            record(2, vec![0.0, 1.0, 0.0]),
        ])
        .unwrap();

        let results = table.search(&[1.0, 0.1, 0.0], -1.0, 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[test]
    fn test_search_with_threshold() {
        let table = EmbeddingTable::new(vec![
            record(1, vec![1.0, 0.0, 0.0]),
            record(2, vec![0.0, 1.0, 0.0]),
        ])
        .unwrap();

        let results = table.search(&[1.0, 0.0, 0.0], 0.9, 10).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 1);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_with_limit_is_sorted() {
        let records = (0..10)
            .map(|i| record(i, vec![1.0, i as f32 * 0.3, (i % 3) as f32]))
            .collect();
        let table = EmbeddingTable::new(records).unwrap();

        let results = table.search(&[1.0, 0.0, 0.0], -1.0, 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, 0);
        assert!(is_sorted_desc(&results));

        let all = table.search(&[0.2, 0.5, 0.1], -1.0, 100).unwrap();
        assert_eq!(all.len(), 10);
        assert!(is_sorted_desc(&all));
    }

    #[test]
    fn test_zero_norm_candidates_excluded() {
        let table = EmbeddingTable::new(vec![
            record(1, vec![0.0, 0.0, 0.0]),
            record(2, vec![0.0, 1.0, 0.0]),
        ])
        .unwrap();

        let results = table.search(&[0.0, 1.0, 0.0], -1.0, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 2);
    }

    #[test]
    fn test_zero_query_rejected() {
        let table = EmbeddingTable::new(vec![record(1, vec![1.0, 0.0, 0.0])]).unwrap();
        let result = table.search(&[0.0, 0.0, 0.0], 0.0, 10);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let table = EmbeddingTable::new(vec![record(1, vec![1.0, 0.0, 0.0])]).unwrap();
        let result = table.search(&[1.0, 0.0], 0.0, 10);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let result = EmbeddingTable::new(vec![
            record(1, vec![1.0, 0.0, 0.0]),
            record(2, vec![1.0, 0.0]),
        ]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    fn cos(a: &[f32], b: &[f32]) -> Option<f32> {
        cosine(a, l2_norm(a), b, l2_norm(b))
    }

    #[test]
    fn test_cosine_symmetric() {
        let pairs = [
            (vec![1.0, 2.0, 3.0], vec![-0.5, 0.25, 4.0]),
            (vec![0.3, -0.7, 0.1], vec![0.9, 0.9, -0.2]),
            (vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]),
        ];
        for (a, b) in pairs {
            assert_eq!(cos(&a, &b), cos(&b, &a));
        }
        assert_eq!(cos(&[1.0, 0.0], &[0.0, 0.0]), None);
        assert!((cos(&[1.0, 0.0], &[-2.0, 0.0]).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_scores_are_cosine() {
        let vectors = vec![vec![0.2, 0.9, -0.4], vec![-1.0, 0.5, 0.5], vec![3.0, 0.0, 1.0]];
        let table = EmbeddingTable::new(
            vectors
                .iter()
                .enumerate()
                .map(|(i, v)| record(i as u64, v.clone()))
                .collect(),
        )
        .unwrap();
        let query = [0.7, -0.1, 0.3];

        for m in table.search(&query, -1.0, 10).unwrap() {
            let candidate = &vectors[m.id as usize];
            assert_eq!(Some(m.similarity), cos(&query, candidate));
            assert_eq!(Some(m.similarity), cos(candidate, &query));
        }
    }

    #[test]
    fn test_load_accepts_name_field() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": 0, "name": "Yirgacheffe", "vector": [1.0, 0.0]}},
                {{"id": 1, "label": "Huila", "vector": [0.0, 1.0]}}]"#
        )
        .unwrap();

        let table = EmbeddingTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.dimensions(), 2);
        assert_eq!(table.records[0].label, "Yirgacheffe");
    }
}
