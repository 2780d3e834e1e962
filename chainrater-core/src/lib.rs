//! The core of ChainRater clients.
//!
//! ChainRater lets people back a 1-5 rating of any URI with a stake that keeps the rating
//! alive for a while. Everything here is independent of how a client talks to the chain:
//! the rating types, the contract codec, the deployment manifest and the in-memory mirror
//! of contract state, plus the statistics and search built on top of that mirror.

pub mod contract;
pub mod deployments;
pub mod error;
pub mod format;
pub mod search;
pub mod state;
pub mod stats;
pub mod types;
pub mod uri;

pub use contract::{RatingRemoved, RatingSubmitted, RatingsAbi, RatingsEvent, UriRevealed};
pub use deployments::Deployments;
pub use error::{RatingsError, Result};
pub use state::{Changes, RatingFilter, RatingsState, Selection};
pub use types::{
    expiration_time, hash_uri, DeletedRating, ExistingRating, LogPosition, Rating, Score, UriHash,
};
