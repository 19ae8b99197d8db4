//! Join ranked ids back to full review rows.

use std::collections::HashMap;

use crate::reviews::{EnrichedReview, Review, ReviewStore};

use super::index::ScoredMatch;

/// Fetch all matched rows in one call and attach each match's similarity.
///
/// Ids missing from the store are dropped. The output is sorted by
/// similarity, highest first, whatever order the store returned rows in.
pub fn hydrate(
    store: &dyn ReviewStore,
    matches: &[ScoredMatch],
) -> anyhow::Result<Vec<EnrichedReview>> {
    if matches.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<u64> = matches.iter().map(|m| m.id).collect();
    let rows: HashMap<u64, Review> = store
        .fetch_by_ids(&ids)?
        .into_iter()
        .map(|review| (review.id, review))
        .collect();

    let mut enriched: Vec<EnrichedReview> = matches
        .iter()
        .filter_map(|m| match rows.get(&m.id) {
            Some(review) => Some(EnrichedReview {
                review: review.clone(),
                similarity: m.similarity,
            }),
            None => {
                log::debug!("review {} ranked but missing from store", m.id);
                None
            }
        })
        .collect();

    enriched.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.review.id.cmp(&b.review.id))
    });

    Ok(enriched)
}
