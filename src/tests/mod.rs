use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::app::engine::{EngineSettings, SearchEngine};
use crate::reviews::{BackendCsv, Review};
use crate::semantic::{
    ConceptStore, Embedder, EmbeddingError, EmbeddingService, RankError, Ranker, RankerKind,
    ScoredMatch,
};


pub const DIMS: usize = 4;

/// Embeds every text to the same vector, or always fails.
pub struct StubEmbedder {
    vector: Option<Vec<f32>>,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.prompts.lock().unwrap().push(text.to_string());
        self.vector
            .clone()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("onnx session crashed".to_string()))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "stub"
    }
}

pub fn embedding_service(vector: Option<Vec<f32>>) -> Arc<EmbeddingService> {
    Arc::new(EmbeddingService::with_loader(move || {
        Ok(Box::new(StubEmbedder {
            vector: vector.clone(),
            prompts: Default::default(),
        }) as Box<dyn Embedder>)
    }))
}

pub fn unloadable_embedding_service() -> Arc<EmbeddingService> {
    Arc::new(EmbeddingService::with_loader(|| {
        Err(EmbeddingError::InitFailed("model download failed".to_string()))
    }))
}

/// Returns canned matches and records every call.
pub struct StaticRanker {
    matches: Vec<ScoredMatch>,
    kind: RankerKind,
    fail: bool,
    pub calls: AtomicUsize,
    pub last_query: std::sync::Mutex<Option<Vec<f32>>>,
}

impl StaticRanker {
    pub fn new(pairs: &[(u64, f32)], kind: RankerKind) -> Arc<Self> {
        Arc::new(Self {
            matches: pairs
                .iter()
                .map(|(id, similarity)| ScoredMatch {
                    id: *id,
                    similarity: *similarity,
                })
                .collect(),
            kind,
            fail: false,
            calls: AtomicUsize::new(0),
            last_query: Default::default(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            matches: vec![],
            kind: RankerKind::Remote,
            fail: true,
            calls: AtomicUsize::new(0),
            last_query: Default::default(),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Ranker for StaticRanker {
    fn rank(
        &self,
        query: &[f32],
        _threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, RankError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.to_vec());
        if self.fail {
            return Err(RankError::Backend(anyhow::anyhow!("rpc match_reviews timed out")));
        }
        Ok(self.matches.iter().take(top_k).copied().collect())
    }

    fn kind(&self) -> RankerKind {
        self.kind
    }
}

pub fn review(id: u64, title: &str, text: &str) -> Review {
    Review {
        id,
        title: title.to_string(),
        roaster: "Test Roasters".to_string(),
        rating: Some(92.0),
        review: text.to_string(),
        ..Default::default()
    }
}

pub fn concepts() -> Arc<ConceptStore> {
    let mut map = HashMap::new();
    map.insert("Fruit".to_string(), vec![1.0, 0.0, 0.0, 0.0]);
    map.insert("Chocolate".to_string(), vec![0.2, 0.9, 0.1, 0.3]);
    map.insert("Light".to_string(), vec![0.5, 0.1, 0.8, 0.2]);
    map.insert("Ethiopia".to_string(), vec![0.6, 0.0, 0.0, 0.8]);
    Arc::new(ConceptStore::from_map(map).unwrap())
}

pub fn engine(
    reviews: Vec<Review>,
    ranker: Arc<dyn Ranker>,
    embeddings: Arc<EmbeddingService>,
) -> SearchEngine {
    SearchEngine::new(
        Arc::new(BackendCsv::with_reviews(reviews)),
        ranker,
        embeddings,
        concepts(),
        EngineSettings::default(),
    )
}
