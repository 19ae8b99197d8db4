use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Instant};

use crate::semantic::lexical::{self, KeywordMatches};

/// A coffee review as stored in the primary table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub id: u64,

    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub roaster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, alias = "loc_country", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, alias = "roast", skip_serializing_if = "Option::is_none")]
    pub roast_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roaster_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_oz_usd: Option<f64>,
    #[serde(default, rename = "100g_USD", skip_serializing_if = "Option::is_none")]
    pub price_per_100g_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aroma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aftertaste: Option<f64>,
}

/// A review joined with the similarity score that ranked it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedReview {
    #[serde(flatten)]
    pub review: Review,
    pub similarity: f32,
}

/// Read side of the primary review table.
pub trait ReviewStore: Send + Sync {
    /// One bulk fetch for a set of ids. Unknown ids are simply absent from
    /// the result; order is unspecified.
    fn fetch_by_ids(&self, ids: &[u64]) -> anyhow::Result<Vec<Review>>;

    /// The `limit` most recent reviews, newest (highest id) first.
    fn latest(&self, limit: usize) -> anyhow::Result<Vec<Review>>;

    fn total(&self) -> anyhow::Result<usize>;

    /// Case-insensitive substring match over review text and title.
    fn keyword_search(&self, query: &str, limit: usize) -> anyhow::Result<KeywordMatches>;
}

/// Reviews loaded from a CSV export and held in memory.
pub struct BackendCsv {
    list: Vec<Review>,
}

impl BackendCsv {
    /// Load the review CSV. When the file has no `id` column the row index
    /// is used as the id, matching how the embeddings were generated.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)
            .with_context(|| format!("couldnt open reviews csv {}", path.display()))?;

        let has_id = csv_reader.headers()?.iter().any(|h| h == "id");

        let mut list = vec![];
        for (idx, record) in csv_reader.deserialize::<Review>().enumerate() {
            let mut review =
                record.with_context(|| format!("malformed review at row {}", idx + 1))?;
            if !has_id {
                review.id = idx as u64;
            }
            list.push(review);
        }

        log::info!(
            "loaded {} reviews from {} in {:?}",
            list.len(),
            path.display(),
            now.elapsed()
        );

        Ok(Self { list })
    }

    pub fn with_reviews(list: Vec<Review>) -> Self {
        Self { list }
    }
}

impl ReviewStore for BackendCsv {
    fn fetch_by_ids(&self, ids: &[u64]) -> anyhow::Result<Vec<Review>> {
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        Ok(self
            .list
            .iter()
            .filter(|review| wanted.contains(&review.id))
            .cloned()
            .collect())
    }

    fn latest(&self, limit: usize) -> anyhow::Result<Vec<Review>> {
        let mut newest: Vec<&Review> = self.list.iter().collect();
        newest.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(newest.into_iter().take(limit).cloned().collect())
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.list.len())
    }

    fn keyword_search(&self, query: &str, limit: usize) -> anyhow::Result<KeywordMatches> {
        Ok(lexical::keyword_matches(query, &self.list, limit))
    }
}
