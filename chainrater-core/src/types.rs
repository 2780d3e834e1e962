//! The common types used across ChainRater clients, and not specific to any one transport.

use crate::error::{RatingsError, Result};
use ethers_core::{
    types::{Address, H256},
    utils::keccak256,
};
use serde::{Deserialize, Serialize};

/// The on-chain key of a rated item: keccak256 of the UTF-8 bytes of the URI.
pub type UriHash = H256;

/// Hash a user supplied URI into the key the contract stores it under.
pub fn hash_uri(uri: &str) -> UriHash {
    H256::from(keccak256(uri.as_bytes()))
}

/// The position of a log in the chain. Events are applied to the cache in this order,
/// and an event whose position is not newer than the cached one is a stale replay.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LogPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

/// A validated rating score.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(RatingsError::InvalidScore(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = RatingsError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

/// A rating that is currently stored in the contract.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct ExistingRating {
    pub uri_hash: UriHash,
    pub rater: Address,
    pub score: u8,
    /// Unix seconds at which the rating was (re)submitted
    pub posted: u64,
    /// Raw stake in wei. It is not adjusted by the stake-per-second rate.
    pub stake: u64,
    pub latest: LogPosition,
}

impl ExistingRating {
    /// Unix seconds after which the stake no longer backs this rating.
    pub fn expiration_time(&self, stake_per_second: u64) -> u64 {
        expiration_time(self.posted, self.stake, stake_per_second)
    }

    pub fn is_expired(&self, stake_per_second: u64, now: u64) -> bool {
        self.expiration_time(stake_per_second) < now
    }
}

/// A rating that was removed from the contract. Only its key and the position of the
/// removal are retained.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct DeletedRating {
    pub uri_hash: UriHash,
    pub rater: Address,
    pub latest: LogPosition,
}

/// The cached state of one `(uri_hash, rater)` slot of the contract.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Rating {
    Existing(ExistingRating),
    Deleted(DeletedRating),
}

impl Rating {
    pub fn uri_hash(&self) -> UriHash {
        match self {
            Rating::Existing(r) => r.uri_hash,
            Rating::Deleted(r) => r.uri_hash,
        }
    }

    pub fn rater(&self) -> Address {
        match self {
            Rating::Existing(r) => r.rater,
            Rating::Deleted(r) => r.rater,
        }
    }

    pub fn latest(&self) -> LogPosition {
        match self {
            Rating::Existing(r) => r.latest,
            Rating::Deleted(r) => r.latest,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Rating::Deleted(_))
    }

    pub fn as_existing(&self) -> Option<&ExistingRating> {
        match self {
            Rating::Existing(r) => Some(r),
            Rating::Deleted(_) => None,
        }
    }

    pub fn into_existing(self) -> Option<ExistingRating> {
        match self {
            Rating::Existing(r) => Some(r),
            Rating::Deleted(_) => None,
        }
    }
}

/// `posted + stake / stake_per_second`, in whole seconds.
///
/// A zero rate would make every stake last forever, so that is what it returns.
pub fn expiration_time(posted: u64, stake: u64, stake_per_second: u64) -> u64 {
    match stake.checked_div(stake_per_second) {
        Some(duration) => posted.saturating_add(duration),
        None => u64::MAX,
    }
}

/// The stake needed to keep a rating alive for `duration_seconds`.
pub fn stake_for_duration(duration_seconds: u64, stake_per_second: u64) -> Option<u64> {
    duration_seconds.checked_mul(stake_per_second)
}

/// The number of whole seconds a stake pays for.
pub fn duration_for_stake(stake: u64, stake_per_second: u64) -> Option<u64> {
    stake.checked_div(stake_per_second)
}
