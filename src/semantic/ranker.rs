//! Ranking strategies.
//!
//! `LocalRanker` scans an in-memory `EmbeddingTable`; `RemoteRanker`
//! delegates to a store's native similarity search. Both return matches
//! sorted by similarity, highest first.

use std::sync::Arc;

use serde::Serialize;

use super::index::{sort_by_similarity, EmbeddingTable, IndexError, ScoredMatch};

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("similarity backend failed: {0:?}")]
    Backend(#[from] anyhow::Error),
}

/// Which strategy answered a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankerKind {
    Local,
    Remote,
}

pub trait Ranker: Send + Sync {
    fn rank(
        &self,
        query: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, RankError>;

    fn kind(&self) -> RankerKind;
}

/// A store that can run nearest-neighbour search itself.
pub trait SimilarityBackend: Send + Sync {
    /// Matches with similarity >= `threshold`, at most `limit`, best first.
    fn match_reviews(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> anyhow::Result<Vec<ScoredMatch>>;
}

pub struct LocalRanker {
    table: Arc<EmbeddingTable>,
}

impl LocalRanker {
    pub fn new(table: Arc<EmbeddingTable>) -> Self {
        Self { table }
    }
}

impl Ranker for LocalRanker {
    fn rank(
        &self,
        query: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, RankError> {
        Ok(self.table.search(query, threshold, top_k)?)
    }

    fn kind(&self) -> RankerKind {
        RankerKind::Local
    }
}

pub struct RemoteRanker {
    backend: Arc<dyn SimilarityBackend>,
}

impl RemoteRanker {
    pub fn new(backend: Arc<dyn SimilarityBackend>) -> Self {
        Self { backend }
    }
}

impl Ranker for RemoteRanker {
    fn rank(
        &self,
        query: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, RankError> {
        let mut matches = self.backend.match_reviews(query, threshold, top_k)?;

        // no NaN scores, at most top_k
        matches.retain(|m| m.similarity.is_finite());
        sort_by_similarity(&mut matches);
        matches.truncate(top_k);

        Ok(matches)
    }

    fn kind(&self) -> RankerKind {
        RankerKind::Remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::index::EmbeddingRecord;
    use anyhow::bail;
    use std::sync::Mutex;

    struct FixedBackend {
        matches: Vec<ScoredMatch>,
        calls: Mutex<Vec<(f32, usize)>>,
    }

    impl SimilarityBackend for FixedBackend {
        fn match_reviews(
            &self,
            _query: &[f32],
            threshold: f32,
            limit: usize,
        ) -> anyhow::Result<Vec<ScoredMatch>> {
            self.calls.lock().unwrap().push((threshold, limit));
            Ok(self.matches.clone())
        }
    }

    struct BrokenBackend;

    impl SimilarityBackend for BrokenBackend {
        fn match_reviews(&self, _: &[f32], _: f32, _: usize) -> anyhow::Result<Vec<ScoredMatch>> {
            bail!("connection refused")
        }
    }

    #[test]
    fn test_local_ranker() {
        let table = EmbeddingTable::new(vec![
            EmbeddingRecord {
                id: 7,
                label: String::new(),
                vector: vec![0.0, 1.0],
            },
            EmbeddingRecord {
                id: 8,
                label: String::new(),
                vector: vec![1.0, 1.0],
            },
        ])
        .unwrap();
        let ranker = LocalRanker::new(Arc::new(table));

        let results = ranker.rank(&[0.0, 1.0], 0.1, 5).unwrap();
        assert_eq!(results.iter().map(|m| m.id).collect::<Vec<_>>(), vec![7, 8]);
        assert_eq!(ranker.kind(), RankerKind::Local);
    }

    #[test]
    fn test_remote_ranker_passes_arguments_and_sanitizes() {
        let backend = Arc::new(FixedBackend {
            matches: vec![
                ScoredMatch { id: 1, similarity: 0.4 },
                ScoredMatch { id: 2, similarity: f32::NAN },
                ScoredMatch { id: 3, similarity: 0.8 },
                ScoredMatch { id: 4, similarity: 0.2 },
            ],
            calls: Mutex::new(vec![]),
        });
        let ranker = RemoteRanker::new(backend.clone());

        let results = ranker.rank(&[1.0, 0.0], 0.1, 2).unwrap();

        assert_eq!(results.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(*backend.calls.lock().unwrap(), vec![(0.1, 2)]);
        assert_eq!(ranker.kind(), RankerKind::Remote);
    }

    #[test]
    fn test_remote_ranker_propagates_backend_error() {
        let ranker = RemoteRanker::new(Arc::new(BrokenBackend));
        let result = ranker.rank(&[1.0], 0.1, 5);
        assert!(matches!(result, Err(RankError::Backend(_))));
    }
}
