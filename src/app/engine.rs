use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use crate::{
    config::{AlchemistConfig, SemanticSearchConfig},
    reviews::{EnrichedReview, Review, ReviewStore},
    semantic::{
        arithmetic::{augment_query, is_zero},
        compose_formula,
        hydrate::hydrate,
        ConceptStore, EmbeddingError, EmbeddingService, EmbeddingState, FormulaStep, Ranker,
        RankerKind,
    },
};

use super::errors::AppError;
use super::trends::{self, TrendsOutcome, TRENDS_WINDOW};

/// Result quality label carried by every search response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Ranked against the in-memory embedding table
    Semantic,
    /// Ranked by the remote store and hydrated from it
    SemanticLiveHydrated,
    /// Substring match; not ranked
    KeywordFallback,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchHit {
    Scored(EnrichedReview),
    Keyword(Review),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: Option<String>,
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub count: usize,
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub message: String,
    pub total_beans: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    /// Nothing to search for
    Ready(ReadyResponse),
    Results(SearchResponse),
}

#[derive(Debug, Clone, Serialize)]
pub struct AlchemistResponse {
    pub results: Vec<EnrichedReview>,
    /// Formula labels with no concept vector
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_concepts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptsResponse {
    pub dimensions: usize,
    pub concepts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub last_updated: Option<String>,
    pub embedding: EmbeddingState,
    pub strategy: RankerKind,
    pub total_reviews: Option<usize>,
}

/// Free-text search input: `q` plus an optional flavor list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQuery {
    pub query: Option<String>,
    pub flavors: Vec<String>,
}

impl TextQuery {
    /// Build from raw parameters; `flavors` is a comma separated list.
    pub fn parse(query: Option<String>, flavors: Option<String>) -> Self {
        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        let flavors = flavors
            .map(|f| {
                f.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self { query, flavors }
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.flavors.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub semantic: SemanticSearchConfig,
    pub alchemist: AlchemistConfig,
    /// Precomputed insights aggregate
    pub insights: Option<PathBuf>,
}

/// Text and formula search over one review store and one ranker.
pub struct SearchEngine {
    store: Arc<dyn ReviewStore>,
    ranker: Arc<dyn Ranker>,
    embeddings: Arc<EmbeddingService>,
    concepts: Arc<ConceptStore>,
    settings: EngineSettings,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        ranker: Arc<dyn Ranker>,
        embeddings: Arc<EmbeddingService>,
        concepts: Arc<ConceptStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            ranker,
            embeddings,
            concepts,
            settings,
        }
    }

    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    /// Semantic search with keyword fallback.
    ///
    /// Any failure while embedding, ranking or hydrating falls back to
    /// keyword matching on `query`. Without free text there is nothing to
    /// fall back on and the response is of type `error`.
    pub fn search_text(&self, text: &TextQuery) -> Result<SearchOutcome, AppError> {
        if text.is_empty() {
            return Ok(SearchOutcome::Ready(ReadyResponse {
                status: "ok".to_string(),
                message: "Semantic search is ready. Send ?q=query or ?flavors=fruity,floral"
                    .to_string(),
                total_beans: self.store.total()?,
            }));
        }

        let now = Instant::now();
        let err = match self.semantic_search(text) {
            Ok(results) => {
                log::info!(
                    "semantic search {:?} via {:?}: {} results in {:?}",
                    text.query,
                    self.ranker.kind(),
                    results.len(),
                    now.elapsed()
                );
                let kind = match self.ranker.kind() {
                    RankerKind::Local => ResultKind::Semantic,
                    RankerKind::Remote => ResultKind::SemanticLiveHydrated,
                };
                return Ok(SearchOutcome::Results(SearchResponse {
                    query: text.query.clone(),
                    kind,
                    count: results.len(),
                    results: results.into_iter().map(SearchHit::Scored).collect(),
                    message: None,
                }));
            }
            Err(err) => err,
        };

        log::error!("semantic search failed: {err}");

        let Some(query) = &text.query else {
            return Ok(SearchOutcome::Results(error_response(
                None,
                "Search failed and no text query provided for fallback.".to_string(),
            )));
        };

        match self
            .store
            .keyword_search(query, self.settings.semantic.keyword_limit)
        {
            Ok(found) => {
                log::warn!(
                    "keyword fallback for {query:?}: {} matches, returning {}",
                    found.total,
                    found.reviews.len()
                );
                // count is every match, results are capped
                Ok(SearchOutcome::Results(SearchResponse {
                    query: Some(query.clone()),
                    kind: ResultKind::KeywordFallback,
                    count: found.total,
                    results: found.reviews.into_iter().map(SearchHit::Keyword).collect(),
                    message: None,
                }))
            }
            Err(fallback_err) => {
                log::error!("keyword fallback failed: {fallback_err:?}");
                Ok(SearchOutcome::Results(error_response(
                    Some(query.clone()),
                    format!("Search failed: {err}"),
                )))
            }
        }
    }

    fn semantic_search(&self, text: &TextQuery) -> Result<Vec<EnrichedReview>, AppError> {
        let prompt = augment_query(text.query.as_deref(), &text.flavors);
        log::debug!("embedding prompt: {prompt:?}");

        let vector = self.embeddings.embed(&prompt)?;
        if vector.len() != self.concepts.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.concepts.dimensions(),
                got: vector.len(),
            }
            .into());
        }

        self.rank_and_hydrate(
            &vector,
            self.settings.semantic.threshold,
            self.settings.semantic.limit,
        )
    }

    /// Rank reviews against a vector built from concept arithmetic.
    pub fn alchemist(&self, formula: &[FormulaStep]) -> Result<AlchemistResponse, AppError> {
        if formula.is_empty() {
            return Err(AppError::InvalidInput("Empty formula".to_string()));
        }

        let composed = compose_formula(&self.concepts, formula);
        if !composed.skipped.is_empty() {
            log::warn!("formula has unknown concepts: {:?}", composed.skipped);
        }
        log::info!("alchemist formula applied {:?}", composed.applied);

        let results = self.rank_and_hydrate(
            &composed.vector,
            self.settings.alchemist.threshold,
            self.settings.alchemist.limit,
        )?;

        Ok(AlchemistResponse {
            results,
            unknown_concepts: composed.skipped,
        })
    }

    /// A zero vector matches nothing; the ranker is not consulted.
    fn rank_and_hydrate(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<EnrichedReview>, AppError> {
        if is_zero(vector) {
            log::info!("query vector is zero, nothing to rank");
            return Ok(vec![]);
        }

        let matches = self.ranker.rank(vector, threshold, limit)?;
        hydrate(self.store.as_ref(), &matches).map_err(AppError::Hydration)
    }

    pub fn concepts(&self) -> ConceptsResponse {
        ConceptsResponse {
            dimensions: self.concepts.dimensions(),
            concepts: self.concepts.labels(),
        }
    }

    /// Keyword trends over the newest reviews.
    pub fn trends(&self) -> Result<TrendsOutcome, AppError> {
        let now = Instant::now();
        let latest = self.store.latest(TRENDS_WINDOW)?;
        let outcome = trends::analyze(&latest);
        log::debug!("analyzed {} reviews in {:?}", latest.len(), now.elapsed());
        Ok(outcome)
    }

    pub fn status(&self) -> StatusResponse {
        let total_reviews = self
            .store
            .total()
            .map_err(|err| log::warn!("couldnt count reviews: {err:?}"))
            .ok();

        StatusResponse {
            last_updated: self
                .settings
                .insights
                .as_deref()
                .and_then(read_last_updated),
            embedding: self.embeddings.state(),
            strategy: self.ranker.kind(),
            total_reviews,
        }
    }
}

fn error_response(query: Option<String>, message: String) -> SearchResponse {
    SearchResponse {
        query,
        kind: ResultKind::Error,
        count: 0,
        results: vec![],
        message: Some(message),
    }
}

/// `last_updated` from the insights aggregate, top level or under
/// `dashboard_stats`.
fn read_last_updated(path: &Path) -> Option<String> {
    let raw = std::fs::read(path)
        .map_err(|err| log::warn!("couldnt read insights {}: {err}", path.display()))
        .ok()?;
    let insights: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|err| log::warn!("insights file is malformed: {err}"))
        .ok()?;

    insights
        .get("last_updated")
        .or_else(|| insights.pointer("/dashboard_stats/last_updated"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}
