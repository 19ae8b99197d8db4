//! Flavor trends over the newest reviews: word frequency in the review
//! text, the top word and the first review that mentions it.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::reviews::Review;

/// Number of newest reviews analyzed.
pub const TRENDS_WINDOW: usize = 50;

const TOP_KEYWORDS: usize = 5;

/// Tasting-note boilerplate that says nothing about flavor.
const SKIP_WORDS: &[&str] = &[
    "and", "with", "the", "a", "in", "of", "cup", "notes", "finish", "mouthfeel", "acidity",
    "structure", "coffee", "bean", "roast", "flavor", "aroma", "brewed", "review",
];

#[derive(Debug, Clone, Serialize)]
pub struct TrendsResponse {
    pub date: String,
    pub trending_flavor: String,
    pub related_keywords: Vec<String>,
    pub champion_bean: Option<Review>,
    pub total_analyzed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TrendsOutcome {
    Trends(TrendsResponse),
    /// Store had no reviews
    NoData { message: String },
}

/// Top keywords by count, ties in order of first appearance.
fn top_keywords(reviews: &[Review], limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    let words = reviews.iter().flat_map(|review| {
        review
            .review
            .to_lowercase()
            .replace(|c: char| c == '.' || c == ',', "")
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>()
    });
    for word in words {
        if word.chars().count() <= 3 || SKIP_WORDS.contains(&word.as_str()) {
            continue;
        }
        let first_seen = counts.len();
        counts.entry(word).or_insert((0, first_seen)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (count_a, seen_a)), (_, (count_b, seen_b))| {
        count_b.cmp(count_a).then(seen_a.cmp(seen_b))
    });
    ranked.into_iter().take(limit).map(|(word, _)| word).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Trends for `reviews`, newest first.
pub fn analyze(reviews: &[Review]) -> TrendsOutcome {
    if reviews.is_empty() {
        return TrendsOutcome::NoData {
            message: "No data available".to_string(),
        };
    }

    let related_keywords = top_keywords(reviews, TOP_KEYWORDS);
    let top = related_keywords
        .first()
        .cloned()
        .unwrap_or_else(|| "coffee".to_string());

    let champion_bean = reviews
        .iter()
        .find(|review| review.review.to_lowercase().contains(&top))
        .cloned();

    TrendsOutcome::Trends(TrendsResponse {
        date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        trending_flavor: capitalize(&top),
        related_keywords,
        champion_bean,
        total_analyzed: reviews.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: u64, text: &str) -> Review {
        Review {
            id,
            title: format!("bean {id}"),
            review: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_top_keywords_skip_boilerplate() {
        let reviews = vec![
            review(3, "Juicy cherry notes, cherry finish and cocoa."),
            review(2, "Cocoa and cherry in the cup. Lemon acidity."),
            review(1, "Cocoa, toffee. Coffee with structure."),
        ];

        assert_eq!(
            top_keywords(&reviews, 5),
            vec!["cherry", "cocoa", "juicy", "lemon", "toffee"]
        );
    }

    #[test]
    fn test_analyze_picks_champion() {
        let reviews = vec![
            review(9, "Plum and cedar."),
            review(8, "Bright plum, plum skin, jasmine."),
            review(7, "Jasmine and bergamot."),
        ];

        match analyze(&reviews) {
            TrendsOutcome::Trends(trends) => {
                assert_eq!(trends.trending_flavor, "Plum");
                assert_eq!(trends.related_keywords[0], "plum");
                assert_eq!(trends.champion_bean.map(|r| r.id), Some(9));
                assert_eq!(trends.total_analyzed, 3);
                assert!(trends.date.ends_with('Z'));
            }
            other => panic!("expected trends, got {other:?}"),
        }
    }

    #[test]
    fn test_no_keywords_falls_back_to_coffee() {
        match analyze(&[review(1, "Big cup and roast.")]) {
            TrendsOutcome::Trends(trends) => {
                assert_eq!(trends.trending_flavor, "Coffee");
                assert!(trends.related_keywords.is_empty());
                assert!(trends.champion_bean.is_none());
            }
            other => panic!("expected trends, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_store() {
        let value = serde_json::to_value(analyze(&[])).unwrap();
        assert_eq!(value, serde_json::json!({"message": "No data available"}));
    }
}
