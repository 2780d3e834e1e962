//! Aggregate statistics over cached ratings: per-URI summaries, the dashboard top lists
//! and per-rater summaries.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    state::RatingsState,
    types::{ExistingRating, Rating, UriHash},
};
use ethers_core::types::Address;
use serde::Serialize;

/// How many entries each dashboard list holds.
pub const TOP_LIST_LEN: usize = 5;
/// A URI needs this many ratings to appear among the top rated.
pub const MIN_RATINGS_FOR_TOP_RATED: usize = 2;
/// A URI needs this many ratings for its spread to mean anything.
pub const MIN_RATINGS_FOR_CONTROVERSIAL: usize = 3;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UriStats {
    pub uri_hash: UriHash,
    /// `None` when the reveal event for this hash has not been seen
    pub uri: Option<String>,
    pub rating_count: usize,
    pub total_stake: u128,
    pub average_score: f64,
    /// Sample variance of the scores, zero with fewer than two ratings
    pub variance: f64,
    /// Sample standard deviation of the scores
    pub std_dev: f64,
    pub has_current_user_rated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Ratings,
    Stake,
    Score,
    Variance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Mean and sample variance of a set of scores.
pub fn mean_and_variance(scores: &[u8]) -> (f64, f64) {
    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let n = scores.len() as f64;
    let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / n;
    if scores.len() < 2 {
        return (mean, 0.0);
    }
    let squared: f64 = scores.iter().map(|&s| (s as f64 - mean).powi(2)).sum();
    (mean, squared / (n - 1.0))
}

/// Group existing ratings by URI and summarise each group.
pub fn uri_stats(
    state: &RatingsState,
    ratings: &[ExistingRating],
    current_account: Option<Address>,
) -> Vec<UriStats> {
    let mut by_uri: BTreeMap<UriHash, Vec<&ExistingRating>> = BTreeMap::new();
    for rating in ratings {
        by_uri.entry(rating.uri_hash).or_default().push(rating);
    }

    by_uri
        .into_iter()
        .map(|(uri_hash, group)| {
            let scores: Vec<u8> = group.iter().map(|r| r.score).collect();
            let (average_score, variance) = mean_and_variance(&scores);
            UriStats {
                uri_hash,
                uri: state.try_uri_from_hash(&uri_hash).map(str::to_string),
                rating_count: group.len(),
                total_stake: group.iter().map(|r| r.stake as u128).sum(),
                average_score,
                variance,
                std_dev: variance.sqrt(),
                has_current_user_rated: current_account
                    .map_or(false, |account| group.iter().any(|r| r.rater == account)),
            }
        })
        .collect()
}

pub fn sort_uri_stats(stats: &mut [UriStats], by: SortBy, direction: SortDirection) {
    stats.sort_by(|a, b| {
        let ordering = match by {
            SortBy::Ratings => a.rating_count.cmp(&b.rating_count),
            SortBy::Stake => a.total_stake.cmp(&b.total_stake),
            SortBy::Score => a.average_score.total_cmp(&b.average_score),
            SortBy::Variance => a.variance.total_cmp(&b.variance),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Dashboard {
    /// Total stake locked across all existing ratings
    pub total_value_locked: u128,
    pub top_staked: Vec<UriStats>,
    pub top_rated: Vec<UriStats>,
    pub most_controversial: Vec<UriStats>,
}

fn top_n(
    stats: &[UriStats],
    keep: impl Fn(&UriStats) -> bool,
    cmp: impl Fn(&UriStats, &UriStats) -> Ordering,
) -> Vec<UriStats> {
    let mut list: Vec<UriStats> = stats.iter().filter(|s| keep(s)).cloned().collect();
    list.sort_by(|a, b| cmp(a, b));
    list.truncate(TOP_LIST_LEN);
    list
}

pub fn dashboard(state: &RatingsState, ratings: &[ExistingRating]) -> Dashboard {
    let stats = uri_stats(state, ratings, None);

    Dashboard {
        total_value_locked: ratings.iter().map(|r| r.stake as u128).sum(),
        top_staked: top_n(&stats, |_| true, |a, b| b.total_stake.cmp(&a.total_stake)),
        top_rated: top_n(
            &stats,
            |s| s.rating_count >= MIN_RATINGS_FOR_TOP_RATED,
            |a, b| b.average_score.total_cmp(&a.average_score),
        ),
        most_controversial: top_n(
            &stats,
            |s| s.rating_count >= MIN_RATINGS_FOR_CONTROVERSIAL,
            |a, b| b.std_dev.total_cmp(&a.std_dev),
        ),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RaterSummary {
    pub address: Address,
    pub rating_count: usize,
    pub total_stake: u128,
    pub average_score: f64,
    pub is_current_user: bool,
}

/// Summarise each rater's existing ratings. The current account sorts first, everyone
/// else by how many ratings they hold.
pub fn rater_summaries(
    raters: &BTreeMap<Address, Vec<Rating>>,
    current_account: Option<Address>,
) -> Vec<RaterSummary> {
    let mut summaries: Vec<RaterSummary> = raters
        .iter()
        .map(|(address, ratings)| {
            let existing: Vec<&ExistingRating> =
                ratings.iter().filter_map(Rating::as_existing).collect();
            let scores: Vec<u8> = existing.iter().map(|r| r.score).collect();
            RaterSummary {
                address: *address,
                rating_count: existing.len(),
                total_stake: existing.iter().map(|r| r.stake as u128).sum(),
                average_score: mean_and_variance(&scores).0,
                is_current_user: current_account == Some(*address),
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.is_current_user
            .cmp(&a.is_current_user)
            .then(b.rating_count.cmp(&a.rating_count))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{hash_uri, LogPosition};

    fn rating(uri: &str, rater: u8, score: u8, stake: u64) -> ExistingRating {
        ExistingRating {
            uri_hash: hash_uri(uri),
            rater: Address::repeat_byte(rater),
            score,
            posted: 0,
            stake,
            latest: LogPosition::default(),
        }
    }

    #[test]
    fn variance_is_sample_variance() {
        let (mean, variance) = mean_and_variance(&[1, 3, 5]);
        assert_eq!(mean, 3.0);
        // ((1-3)^2 + 0 + (5-3)^2) / 2
        assert_eq!(variance, 4.0);
        assert_eq!(mean_and_variance(&[4]), (4.0, 0.0));
        assert_eq!(mean_and_variance(&[]), (0.0, 0.0));
    }

    #[test]
    fn uri_stats_groups_and_flags_current_user() {
        let mut state = RatingsState::new();
        state.cache_uri("app://a");
        let ratings = vec![
            rating("app://a", 1, 5, 10),
            rating("app://a", 2, 3, 20),
            rating("app://b", 2, 1, 5),
        ];
        let stats = uri_stats(&state, &ratings, Some(Address::repeat_byte(1)));
        let a = stats.iter().find(|s| s.uri_hash == hash_uri("app://a")).unwrap();
        assert_eq!(a.uri.as_deref(), Some("app://a"));
        assert_eq!(a.rating_count, 2);
        assert_eq!(a.total_stake, 30);
        assert_eq!(a.average_score, 4.0);
        assert!(a.has_current_user_rated);

        let b = stats.iter().find(|s| s.uri_hash == hash_uri("app://b")).unwrap();
        assert_eq!(b.uri, None);
        assert!(!b.has_current_user_rated);
    }

    #[test]
    fn sorting_respects_direction() {
        let state = RatingsState::new();
        let ratings = vec![
            rating("app://a", 1, 5, 10),
            rating("app://b", 1, 1, 30),
            rating("app://b", 2, 1, 30),
        ];
        let mut stats = uri_stats(&state, &ratings, None);

        sort_uri_stats(&mut stats, SortBy::Stake, SortDirection::Desc);
        assert_eq!(stats[0].uri_hash, hash_uri("app://b"));
        sort_uri_stats(&mut stats, SortBy::Score, SortDirection::Desc);
        assert_eq!(stats[0].uri_hash, hash_uri("app://a"));
        sort_uri_stats(&mut stats, SortBy::Ratings, SortDirection::Asc);
        assert_eq!(stats[0].uri_hash, hash_uri("app://a"));
    }

    #[test]
    fn dashboard_applies_minimum_counts() {
        let state = RatingsState::new();
        let ratings = vec![
            rating("app://single", 1, 5, 1_000),
            rating("app://pair", 1, 4, 1),
            rating("app://pair", 2, 4, 1),
            rating("app://trio", 1, 1, 1),
            rating("app://trio", 2, 5, 1),
            rating("app://trio", 3, 3, 1),
        ];
        let board = dashboard(&state, &ratings);
        assert_eq!(board.total_value_locked, 1_005);
        assert_eq!(board.top_staked[0].uri_hash, hash_uri("app://single"));
        assert_eq!(board.top_rated.len(), 2);
        assert_eq!(board.top_rated[0].uri_hash, hash_uri("app://pair"));
        assert_eq!(board.most_controversial.len(), 1);
        assert_eq!(board.most_controversial[0].uri_hash, hash_uri("app://trio"));
    }

    #[test]
    fn rater_summaries_put_current_user_first() {
        let mut raters = BTreeMap::new();
        raters.insert(
            Address::repeat_byte(1),
            vec![Rating::Existing(rating("app://a", 1, 2, 5))],
        );
        raters.insert(
            Address::repeat_byte(2),
            vec![
                Rating::Existing(rating("app://a", 2, 4, 5)),
                Rating::Existing(rating("app://b", 2, 5, 5)),
            ],
        );

        let summaries = rater_summaries(&raters, Some(Address::repeat_byte(1)));
        assert!(summaries[0].is_current_user);
        assert_eq!(summaries[1].rating_count, 2);
        assert_eq!(summaries[1].average_score, 4.5);
        assert_eq!(summaries[1].total_stake, 10);

        let summaries = rater_summaries(&raters, None);
        assert_eq!(summaries[0].address, Address::repeat_byte(2));
    }
}
