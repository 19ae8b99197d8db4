//! Keyword fallback used when semantic search is unavailable.
//!
//! Plain case-insensitive substring containment over the review text and
//! title. No scoring: results keep corpus order. Responses built from this
//! are labelled `keyword_fallback`.

use crate::reviews::Review;

/// Default cap on fallback results.
pub const DEFAULT_KEYWORD_LIMIT: usize = 5;

/// Keyword hits: every match is counted, at most `limit` are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordMatches {
    /// Matches before the cap
    pub total: usize,
    pub reviews: Vec<Review>,
}

/// Reviews whose text or title contains `query`.
pub fn keyword_matches(query: &str, corpus: &[Review], limit: usize) -> KeywordMatches {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return KeywordMatches::default();
    }

    let mut found = KeywordMatches::default();
    for review in corpus.iter().filter(|review| matches(&needle, review)) {
        found.total += 1;
        if found.reviews.len() < limit {
            found.reviews.push(review.clone());
        }
    }
    found
}

fn matches(needle: &str, review: &Review) -> bool {
    review.review.to_lowercase().contains(needle) || review.title.to_lowercase().contains(needle)
}
