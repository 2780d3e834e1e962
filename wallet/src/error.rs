//! Errors surfaced by the blockchain service.

use chainrater_core::RatingsError;
use ethers_core::types::H256;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unsupported chain. ID={0}")]
    BadChain(u64),

    /// A write was requested but no wallet endpoint is configured.
    #[error("no wallet endpoint configured")]
    MissingWeb3,

    #[error("no account available to sign with")]
    MissingAccount,

    #[error("not connected")]
    NotConnected,

    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    #[error("{0} already initialized")]
    AlreadyInitialized(&'static str),

    #[error("{0}")]
    NotFound(String),

    /// The pre-flight `eth_call` of a write failed. Carries the decoded revert reason.
    #[error("transaction simulation failed: {0}")]
    Simulation(String),

    #[error("transaction {0:?} reverted")]
    Reverted(H256),

    #[error("transaction {0:?} was not confirmed in time")]
    ConfirmationTimeout(H256),

    #[error(transparent)]
    Rpc(#[from] jsonrpsee::core::Error),

    #[error(transparent)]
    Ratings(RatingsError),
}

impl From<RatingsError> for ServiceError {
    fn from(err: RatingsError) -> Self {
        match err {
            RatingsError::BadChain(id) => Self::BadChain(id),
            RatingsError::NotInitialized(what) => Self::NotInitialized(what),
            RatingsError::NotFound(what) => Self::NotFound(what),
            other => Self::Ratings(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
