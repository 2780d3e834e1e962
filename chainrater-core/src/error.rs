//! Errors surfaced by the core crate.

use ethers_core::types::H256;

/// Everything that can go wrong while reading or updating the local mirror of the
/// Ratings contract, or while decoding data that came from it.
#[derive(Debug, thiserror::Error)]
pub enum RatingsError {
    /// A contract constant was read before the contract wrapper was initialised.
    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    /// The requested item is not in the local cache.
    #[error("{0}")]
    NotFound(String),

    /// Filtering by expiration only makes sense for ratings that still exist.
    #[error("cannot filter by expired unless deleted is false")]
    ExpiredRequiresExisting,

    /// Looking up a URI needs a URI to look up.
    #[error("please enter a search term")]
    EmptySearch,

    /// Scores live in `1..=5`.
    #[error("score must be between 1 and 5, got {0}")]
    InvalidScore(u8),

    /// The chain is not supported, or the contract is not deployed on it.
    #[error("unsupported chain. ID={0}")]
    BadChain(u64),

    /// The deployments manifest could not be understood.
    #[error("invalid deployments file: {0}")]
    InvalidDeploymentsFile(String),

    /// A log could not be decoded into a Ratings event.
    #[error("malformed log: {0}")]
    MalformedLog(String),

    /// A log carried a topic that does not belong to any Ratings event.
    #[error("unknown event topic {0:?}")]
    UnknownEvent(H256),

    #[error(transparent)]
    Abi(#[from] ethers_core::abi::Error),
}

pub type Result<T> = std::result::Result<T, RatingsError>;
