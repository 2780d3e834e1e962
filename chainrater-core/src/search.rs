//! Searching the cached ratings.
//!
//! There are four kinds of search. `All`, `Rate` and `Guide` look up one URI and summarise
//! its ratings. `Cleanup` lists ratings whose stake has run out, which anyone may remove
//! from the contract.

use crate::{
    error::{RatingsError, Result},
    state::{RatingFilter, RatingsState},
    stats::mean_and_variance,
    types::{ExistingRating, UriHash},
};
use ethers_core::types::Address;
use serde::Serialize;

/// How many ratings a URI result carries along.
pub const TOP_RATINGS: usize = 3;
/// How many results a `Rate` search returns.
pub const RATE_RESULTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchKind {
    #[default]
    All,
    Rate,
    Guide,
    Cleanup,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub uri_hash: UriHash,
    pub decoded_uri: Option<String>,
    pub average_score: f64,
    pub rating_count: usize,
    pub top_ratings: Vec<ExistingRating>,
    pub is_expired: bool,
    /// Only set for cleanup results
    pub stake: Option<u64>,
    pub expiration_time: Option<u64>,
    pub rater: Option<Address>,
}

/// Run a search over the cache. `now` is in unix seconds.
pub fn search(
    state: &RatingsState,
    query: &str,
    kind: SearchKind,
    now: u64,
) -> Result<Vec<SearchResult>> {
    let query = query.trim();
    if query.is_empty() && kind != SearchKind::Cleanup {
        return Err(RatingsError::EmptySearch);
    }
    let mut results = Vec::new();

    match kind {
        SearchKind::All | SearchKind::Rate | SearchKind::Guide => {
            let ratings = state.existing_ratings(&RatingFilter::default().uri(query), now)?;
            if let Some(first) = ratings.first() {
                let scores: Vec<u8> = ratings.iter().map(|r| r.score).collect();
                let is_expired = match state.stake_per_second() {
                    Ok(rate) => ratings.iter().all(|r| r.is_expired(rate, now)),
                    Err(_) => false,
                };
                results.push(SearchResult {
                    uri_hash: first.uri_hash,
                    decoded_uri: Some(query.to_string()),
                    average_score: mean_and_variance(&scores).0,
                    rating_count: ratings.len(),
                    top_ratings: ratings.iter().take(TOP_RATINGS).cloned().collect(),
                    is_expired,
                    stake: None,
                    expiration_time: None,
                    rater: None,
                });
            }
        }
        SearchKind::Cleanup => {
            let stake_per_second = state.stake_per_second()?;
            let expired = state.existing_ratings(&RatingFilter::existing().expired(true), now)?;
            for rating in expired {
                results.push(SearchResult {
                    uri_hash: rating.uri_hash,
                    decoded_uri: state.try_uri_from_hash(&rating.uri_hash).map(str::to_string),
                    average_score: rating.score as f64,
                    rating_count: 1,
                    is_expired: true,
                    stake: Some(rating.stake),
                    expiration_time: Some(rating.expiration_time(stake_per_second)),
                    rater: Some(rating.rater),
                    top_ratings: vec![rating],
                });
            }
        }
    }

    let needle = query.to_lowercase();
    let matches_query = |result: &SearchResult| {
        result
            .decoded_uri
            .as_deref()
            .map_or(false, |uri| uri.to_lowercase().contains(&needle))
    };

    let results = match kind {
        SearchKind::Cleanup => results.into_iter().filter(|r| r.is_expired).collect(),
        SearchKind::Guide => {
            let mut results: Vec<SearchResult> =
                results.into_iter().filter(|r| !r.is_expired).collect();
            results.sort_by(|a, b| b.average_score.total_cmp(&a.average_score));
            results
        }
        SearchKind::Rate => results
            .into_iter()
            .filter(|r| matches_query(r))
            .take(RATE_RESULTS)
            .collect(),
        SearchKind::All => results.into_iter().filter(|r| matches_query(r)).collect(),
    };
    Ok(results)
}
