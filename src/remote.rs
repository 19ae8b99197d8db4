use anyhow::{anyhow, bail, Context};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use crate::{
    config::RemoteConfig,
    reviews::{Review, ReviewStore},
    semantic::{
        lexical::{self, KeywordMatches},
        ScoredMatch, SimilarityBackend,
    },
};

/// Review table and similarity function behind a PostgREST endpoint.
pub struct RemoteStore {
    base_url: Url,
    api_key: String,
    table: String,
    match_rpc: String,
    timeout: Duration,
}

impl RemoteStore {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let addr = config.url.strip_suffix('/').unwrap_or(&config.url);
        let base_url = Url::parse(&format!("{addr}/rest/v1/"))
            .with_context(|| format!("invalid remote url {:?}", config.url))?;

        Ok(RemoteStore {
            base_url,
            api_key: config.api_key.clone(),
            table: config.table.clone(),
            match_rpc: config.match_rpc.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn client(&self) -> anyhow::Result<reqwest::blocking::Client> {
        Ok(reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?)
    }

    fn get(&self, url: Url) -> anyhow::Result<reqwest::blocking::RequestBuilder> {
        log::debug!("GET {url}");
        Ok(self
            .client()?
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key))
    }

    fn post(&self, url: Url) -> anyhow::Result<reqwest::blocking::RequestBuilder> {
        log::debug!("POST {url}");
        Ok(self
            .client()?
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key))
    }

    /// `{base}/rest/v1/{table}?select=*&...`
    fn table_url(&self, filters: &[(&str, String)]) -> anyhow::Result<Url> {
        let mut url = self.base_url.join(&self.table)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (key, value) in filters {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn rpc_url(&self) -> anyhow::Result<Url> {
        Ok(self.base_url.join(&format!("rpc/{}", self.match_rpc))?)
    }
}

fn handle_response<T>(response: reqwest::blocking::Response) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let text = response.text()?;

    if !status.is_success() {
        bail!("remote store returned {status}: {text}");
    }

    serde_json::from_str::<T>(&text).map_err(|err| {
        log::error!("{err}. tried to parse: {text:?}");
        anyhow!(err)
    })
}

/// `id=in.(1,2,3)`
fn ids_filter(ids: &[u64]) -> String {
    let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
    format!("in.({})", ids.join(","))
}

/// `(review.ilike.*term*,title.ilike.*term*)`. Characters with a meaning in
/// the filter grammar become the `_` single-character wildcard, so the
/// pattern matches a superset of the literal term.
fn keyword_filter(query: &str) -> String {
    let term: String = query
        .trim()
        .chars()
        .map(|c| match c {
            ',' | '(' | ')' | '*' | '"' | '\\' | '.' | ':' => '_',
            c => c,
        })
        .collect();
    format!("(review.ilike.*{term}*,title.ilike.*{term}*)")
}

/// Total from a `Content-Range: 0-0/123` header.
fn parse_content_range(value: &str) -> Option<usize> {
    value.rsplit('/').next()?.parse().ok()
}

impl ReviewStore for RemoteStore {
    fn fetch_by_ids(&self, ids: &[u64]) -> anyhow::Result<Vec<Review>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let url = self.table_url(&[("id", ids_filter(ids))])?;
        handle_response(self.get(url)?.send()?)
    }

    fn latest(&self, limit: usize) -> anyhow::Result<Vec<Review>> {
        let url = self.table_url(&[
            ("order", "id.desc".to_string()),
            ("limit", limit.to_string()),
        ])?;
        handle_response(self.get(url)?.send()?)
    }

    fn total(&self) -> anyhow::Result<usize> {
        let url = self.table_url(&[("limit", "1".to_string())])?;
        let response = self.get(url)?.header("Prefer", "count=exact").send()?;

        let total = response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| anyhow!("remote store did not return a row count"))?;

        Ok(total)
    }

    fn keyword_search(&self, query: &str, limit: usize) -> anyhow::Result<KeywordMatches> {
        if query.trim().is_empty() {
            return Ok(KeywordMatches::default());
        }

        // uncapped: wildcards may admit rows the literal term rejects
        let url = self.table_url(&[
            ("or", keyword_filter(query)),
            ("order", "id.asc".to_string()),
        ])?;
        let candidates: Vec<Review> = handle_response(self.get(url)?.send()?)?;
        log::debug!("{} keyword candidates for {query:?}", candidates.len());

        Ok(lexical::keyword_matches(query, &candidates, limit))
    }
}

impl SimilarityBackend for RemoteStore {
    fn match_reviews(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> anyhow::Result<Vec<ScoredMatch>> {
        let response = self
            .post(self.rpc_url()?)?
            .json(&json!({
                "query_embedding": query,
                "match_threshold": threshold,
                "match_count": limit,
            }))
            .send()?;

        let matches: Vec<ScoredMatch> = handle_response(response)?;
        log::debug!("{} returned {} matches", self.match_rpc, matches.len());
        Ok(matches)
    }
}
