//! The in-memory mirror of the Ratings contract's storage.
//!
//! The mirror is built by replaying the contract's event logs and then kept current by
//! applying live logs as they arrive. It approximates the contract storage closely enough
//! to filter ratings by URI, rater, expiration and deletion without any further RPC
//! round trips. It is never persisted: a new connection starts from an empty mirror.
//!
//! ## Schema
//!
//! HashToUri   uri_hash => uri
//! Ratings     uri_hash => rater => Rating

use std::collections::BTreeMap;

use crate::{
    contract::{RatingRemoved, RatingSubmitted, RatingsEvent, UriRevealed},
    error::{RatingsError, Result},
    types::{hash_uri, DeletedRating, ExistingRating, LogPosition, Rating, UriHash},
};
use ethers_core::types::Address;

/// Which cached ratings to select.
///
/// Supplying both a URI (or its hash) and a rater selects at most one rating.
#[derive(Debug, Default, Clone)]
pub struct RatingFilter {
    /// Hashed when `uri_hash` is not given
    pub uri: Option<String>,
    pub uri_hash: Option<UriHash>,
    pub rater: Option<Address>,
    /// Only allowed together with `deleted: Some(false)`
    pub expired: Option<bool>,
    pub deleted: Option<bool>,
}

impl RatingFilter {
    pub fn existing() -> Self {
        Self {
            deleted: Some(false),
            ..Default::default()
        }
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn uri_hash(mut self, uri_hash: UriHash) -> Self {
        self.uri_hash = Some(uri_hash);
        self
    }

    pub fn rater(mut self, rater: Address) -> Self {
        self.rater = Some(rater);
        self
    }

    pub fn expired(mut self, expired: bool) -> Self {
        self.expired = Some(expired);
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = Some(deleted);
        self
    }

    fn resolved_uri_hash(&self) -> Option<UriHash> {
        self.uri_hash.or_else(|| self.uri.as_deref().map(hash_uri))
    }
}

/// The result of a cache query. A query naming both a URI and a rater addresses a single
/// contract slot; every other query is a list.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Selection {
    One(Option<Rating>),
    Many(Vec<Rating>),
}

impl Selection {
    /// Flatten into a list, regardless of the shape of the query.
    pub fn into_vec(self) -> Vec<Rating> {
        match self {
            Selection::One(rating) => rating.into_iter().collect(),
            Selection::Many(ratings) => ratings,
        }
    }
}

/// What a batch of events changed, for notifying listeners.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Changes {
    pub submitted: Vec<RatingSubmitted>,
    pub removed: Vec<RatingRemoved>,
    pub revealed: Vec<UriRevealed>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty() && self.removed.is_empty() && self.revealed.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct RatingsState {
    min_stake: Option<u64>,
    stake_per_second: Option<u64>,
    hash_to_uri: BTreeMap<UriHash, String>,
    ratings: BTreeMap<UriHash, BTreeMap<Address, Rating>>,
}

impl RatingsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_constants(&mut self, min_stake: u64, stake_per_second: u64) {
        self.min_stake = Some(min_stake);
        self.stake_per_second = Some(stake_per_second);
    }

    pub fn min_stake(&self) -> Result<u64> {
        self.min_stake
            .ok_or(RatingsError::NotInitialized("Ratings.minStake"))
    }

    pub fn stake_per_second(&self) -> Result<u64> {
        self.stake_per_second
            .ok_or(RatingsError::NotInitialized("Ratings.stakePerSecond"))
    }

    pub fn uri_from_hash(&self, hash: &UriHash) -> Result<&str> {
        self.hash_to_uri
            .get(hash)
            .map(String::as_str)
            .ok_or_else(|| RatingsError::NotFound(format!("URI not found for hash: {hash:?}")))
    }

    /// The revealed URI for a hash, if the reveal has been seen.
    pub fn try_uri_from_hash(&self, hash: &UriHash) -> Option<&str> {
        self.hash_to_uri.get(hash).map(String::as_str)
    }

    /// Remember a URI locally, ahead of (or instead of) its reveal event.
    pub fn cache_uri(&mut self, uri: &str) -> UriHash {
        let hash = hash_uri(uri);
        self.hash_to_uri.entry(hash).or_insert_with(|| uri.to_string());
        hash
    }

    /// Record a revealed URI. The mapping is append only.
    pub fn apply_uri_revealed(&mut self, event: &UriRevealed) -> bool {
        if self.hash_to_uri.contains_key(&event.uri_hash) {
            return false;
        }
        self.hash_to_uri.insert(event.uri_hash, event.uri.clone());
        true
    }

    fn is_stale(&self, uri_hash: &UriHash, rater: &Address, event: LogPosition) -> bool {
        self.ratings
            .get(uri_hash)
            .and_then(|raters| raters.get(rater))
            .map_or(false, |cached| cached.latest() >= event)
    }

    /// Apply a submission. Returns false when the event is older than the cached slot.
    pub fn apply_rating_submitted(&mut self, event: &RatingSubmitted) -> bool {
        if self.is_stale(&event.uri_hash, &event.rater, event.position) {
            log::trace!("Ignoring stale submission at {:?}", event.position);
            return false;
        }
        self.ratings.entry(event.uri_hash).or_default().insert(
            event.rater,
            Rating::Existing(ExistingRating {
                uri_hash: event.uri_hash,
                rater: event.rater,
                score: event.score,
                posted: event.posted,
                stake: event.stake,
                latest: event.position,
            }),
        );
        true
    }

    /// Apply a removal. Returns false when the event is older than the cached slot.
    pub fn apply_rating_removed(&mut self, event: &RatingRemoved) -> bool {
        if self.is_stale(&event.uri_hash, &event.rater, event.position) {
            log::trace!("Ignoring stale removal at {:?}", event.position);
            return false;
        }
        self.ratings.entry(event.uri_hash).or_default().insert(
            event.rater,
            Rating::Deleted(DeletedRating {
                uri_hash: event.uri_hash,
                rater: event.rater,
                latest: event.position,
            }),
        );
        true
    }

    pub fn apply(&mut self, event: &RatingsEvent) -> bool {
        match event {
            RatingsEvent::Submitted(e) => self.apply_rating_submitted(e),
            RatingsEvent::Removed(e) => self.apply_rating_removed(e),
            RatingsEvent::Revealed(e) => self.apply_uri_revealed(e),
        }
    }

    /// Apply a batch of events in chain order and report what changed.
    pub fn apply_all(&mut self, events: impl IntoIterator<Item = RatingsEvent>) -> Changes {
        let mut events: Vec<RatingsEvent> = events.into_iter().collect();
        events.sort_by_key(RatingsEvent::position);

        let mut changes = Changes::default();
        for event in events {
            if !self.apply(&event) {
                continue;
            }
            match event {
                RatingsEvent::Submitted(e) => changes.submitted.push(e),
                RatingsEvent::Removed(e) => changes.removed.push(e),
                RatingsEvent::Revealed(e) => changes.revealed.push(e),
            }
        }
        changes
    }

    /// Select cached ratings.
    ///
    /// `now` is in unix seconds and only matters when filtering by expiration.
    pub fn get_ratings(&self, filter: &RatingFilter, now: u64) -> Result<Selection> {
        if filter.expired.is_some() && filter.deleted != Some(false) {
            return Err(RatingsError::ExpiredRequiresExisting);
        }
        let stake_per_second = match filter.expired {
            Some(_) => Some(self.stake_per_second()?),
            None => None,
        };

        let keep = |rating: &Rating| -> bool {
            if let Some(deleted) = filter.deleted {
                if rating.is_deleted() != deleted {
                    return false;
                }
            }
            match (filter.expired, stake_per_second, rating) {
                (Some(expired), Some(rate), Rating::Existing(r)) => {
                    r.is_expired(rate, now) == expired
                }
                _ => true,
            }
        };

        let uri_hash = filter.resolved_uri_hash();
        let selection = match (uri_hash, filter.rater) {
            (Some(uri_hash), Some(rater)) => Selection::One(
                self.ratings
                    .get(&uri_hash)
                    .and_then(|raters| raters.get(&rater))
                    .filter(|r| keep(r))
                    .cloned(),
            ),
            (Some(uri_hash), None) => Selection::Many(
                self.ratings
                    .get(&uri_hash)
                    .into_iter()
                    .flat_map(|raters| raters.values())
                    .filter(|r| keep(r))
                    .cloned()
                    .collect(),
            ),
            (None, Some(rater)) => Selection::Many(
                self.ratings
                    .values()
                    .filter_map(|raters| raters.get(&rater))
                    .filter(|r| keep(r))
                    .cloned()
                    .collect(),
            ),
            (None, None) => Selection::Many(
                self.ratings
                    .values()
                    .flat_map(|raters| raters.values())
                    .filter(|r| keep(r))
                    .cloned()
                    .collect(),
            ),
        };
        Ok(selection)
    }

    /// Like `get_ratings`, restricted to ratings that still exist.
    pub fn existing_ratings(&self, filter: &RatingFilter, now: u64) -> Result<Vec<ExistingRating>> {
        let filter = RatingFilter {
            deleted: Some(false),
            ..filter.clone()
        };
        Ok(self
            .get_ratings(&filter, now)?
            .into_vec()
            .into_iter()
            .filter_map(Rating::into_existing)
            .collect())
    }

    /// Every rater that has touched the contract, with all of their cached ratings.
    pub fn raters(&self) -> BTreeMap<Address, Vec<Rating>> {
        let mut raters: BTreeMap<Address, Vec<Rating>> = BTreeMap::new();
        for rating in self.ratings.values().flat_map(|r| r.values()) {
            raters.entry(rating.rater()).or_default().push(rating.clone());
        }
        raters
    }

    pub fn uri_count(&self) -> usize {
        self.hash_to_uri.len()
    }

    pub fn rating_count(&self) -> usize {
        self.ratings.values().map(BTreeMap::len).sum()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(uri: &str, rater: u8, score: u8, block: u64) -> RatingSubmitted {
        RatingSubmitted {
            uri_hash: hash_uri(uri),
            rater: Address::repeat_byte(rater),
            score,
            stake: 100,
            posted: 1_000,
            resubmit: false,
            position: LogPosition::new(block, 0),
        }
    }

    fn removed(uri: &str, rater: u8, block: u64) -> RatingRemoved {
        RatingRemoved {
            uri_hash: hash_uri(uri),
            rater: Address::repeat_byte(rater),
            cleanup: false,
            position: LogPosition::new(block, 0),
        }
    }

    #[test]
    fn constants_must_be_initialised() {
        let mut state = RatingsState::new();
        assert!(matches!(
            state.stake_per_second(),
            Err(RatingsError::NotInitialized(_))
        ));
        state.set_constants(10, 2);
        assert_eq!(state.min_stake().unwrap(), 10);
        assert_eq!(state.stake_per_second().unwrap(), 2);
    }

    #[test]
    fn stale_submission_is_ignored() {
        let mut state = RatingsState::new();
        assert!(state.apply_rating_submitted(&submitted("app://a", 1, 5, 10)));
        assert!(!state.apply_rating_submitted(&submitted("app://a", 1, 1, 9)));
        // Replay of the very same log
        assert!(!state.apply_rating_submitted(&submitted("app://a", 1, 1, 10)));

        let rating = state
            .get_ratings(&RatingFilter::default().uri("app://a").rater(Address::repeat_byte(1)), 0)
            .unwrap();
        match rating {
            Selection::One(Some(Rating::Existing(r))) => assert_eq!(r.score, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn removal_soft_deletes_and_resubmission_restores() {
        let mut state = RatingsState::new();
        state.apply_rating_submitted(&submitted("app://a", 1, 3, 1));
        assert!(state.apply_rating_removed(&removed("app://a", 1, 2)));

        let all = state.get_ratings(&RatingFilter::default(), 0).unwrap().into_vec();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_deleted());

        assert!(state.apply_rating_submitted(&submitted("app://a", 1, 4, 3)));
        let existing = state.existing_ratings(&RatingFilter::default(), 0).unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].score, 4);
    }

    #[test]
    fn older_removal_does_not_delete_newer_submission() {
        let mut state = RatingsState::new();
        state.apply_rating_submitted(&submitted("app://a", 1, 3, 5));
        assert!(!state.apply_rating_removed(&removed("app://a", 1, 4)));
        assert_eq!(state.existing_ratings(&RatingFilter::default(), 0).unwrap().len(), 1);
    }

    #[test]
    fn same_block_events_resolve_by_log_index() {
        let mut state = RatingsState::new();
        let mut first = submitted("app://a", 1, 3, 5);
        first.position = LogPosition::new(5, 0);
        let mut removal = removed("app://a", 1, 5);
        removal.position = LogPosition::new(5, 1);

        // Delivered out of order, applied in chain order.
        let changes = state.apply_all(vec![
            RatingsEvent::Removed(removal),
            RatingsEvent::Submitted(first),
        ]);
        assert_eq!(changes.submitted.len(), 1);
        assert_eq!(changes.removed.len(), 1);
        assert!(state.get_ratings(&RatingFilter::default(), 0).unwrap().into_vec()[0].is_deleted());
    }

    #[test]
    fn filters_by_uri_and_rater() {
        let mut state = RatingsState::new();
        state.apply_rating_submitted(&submitted("app://a", 1, 3, 1));
        state.apply_rating_submitted(&submitted("app://a", 2, 4, 1));
        state.apply_rating_submitted(&submitted("app://b", 1, 5, 1));

        let by_uri = state.get_ratings(&RatingFilter::default().uri("app://a"), 0).unwrap();
        assert_eq!(by_uri.into_vec().len(), 2);

        let by_rater = state
            .get_ratings(&RatingFilter::default().rater(Address::repeat_byte(1)), 0)
            .unwrap();
        assert_eq!(by_rater.into_vec().len(), 2);

        let missing = state
            .get_ratings(
                &RatingFilter::default().uri("app://b").rater(Address::repeat_byte(2)),
                0,
            )
            .unwrap();
        assert_eq!(missing, Selection::One(None));
    }

    #[test]
    fn expired_filter_needs_existing_ratings() {
        let mut state = RatingsState::new();
        state.set_constants(1, 1);
        assert!(matches!(
            state.get_ratings(&RatingFilter::default().expired(true), 0),
            Err(RatingsError::ExpiredRequiresExisting)
        ));
        assert!(matches!(
            state.get_ratings(&RatingFilter::default().expired(true).deleted(true), 0),
            Err(RatingsError::ExpiredRequiresExisting)
        ));
    }

    #[test]
    fn expired_filter_uses_stake_per_second() {
        let mut state = RatingsState::new();
        state.set_constants(1, 1);
        // posted 1_000, stake 100 => expires at 1_100
        state.apply_rating_submitted(&submitted("app://a", 1, 3, 1));

        let expired = RatingFilter::existing().expired(true);
        let live = RatingFilter::existing().expired(false);
        assert!(state.get_ratings(&expired, 1_100).unwrap().into_vec().is_empty());
        assert_eq!(state.get_ratings(&live, 1_100).unwrap().into_vec().len(), 1);
        assert_eq!(state.get_ratings(&expired, 1_101).unwrap().into_vec().len(), 1);
    }

    #[test]
    fn uri_reveals_are_append_only() {
        let mut state = RatingsState::new();
        let hash = hash_uri("book://dune");
        let reveal = |uri: &str| UriRevealed {
            uri_hash: hash,
            uri: uri.to_string(),
            position: LogPosition::new(1, 0),
        };
        assert!(state.apply_uri_revealed(&reveal("book://dune")));
        assert!(!state.apply_uri_revealed(&reveal("book://other")));
        assert_eq!(state.uri_from_hash(&hash).unwrap(), "book://dune");
        assert!(matches!(
            state.uri_from_hash(&hash_uri("nothing")),
            Err(RatingsError::NotFound(_))
        ));
    }

    #[test]
    fn raters_groups_every_slot() {
        let mut state = RatingsState::new();
        state.apply_rating_submitted(&submitted("app://a", 1, 3, 1));
        state.apply_rating_submitted(&submitted("app://b", 1, 3, 1));
        state.apply_rating_removed(&removed("app://c", 2, 1));

        let raters = state.raters();
        assert_eq!(raters[&Address::repeat_byte(1)].len(), 2);
        assert_eq!(raters[&Address::repeat_byte(2)].len(), 1);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut state = RatingsState::new();
        state.set_constants(1, 1);
        state.cache_uri("app://a");
        state.apply_rating_submitted(&submitted("app://a", 1, 3, 1));
        state.clear();
        assert_eq!(state.rating_count(), 0);
        assert_eq!(state.uri_count(), 0);
        assert!(state.min_stake().is_err());
    }
}
