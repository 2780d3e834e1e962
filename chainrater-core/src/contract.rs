//! Encoding and decoding for the Ratings contract.
//!
//! All knowledge of the ABI lives here. The wallet only ever deals in the typed
//! calls and events below, and in raw bytes on the wire.

use crate::{
    error::{RatingsError, Result},
    types::{LogPosition, Score, UriHash},
};
use ethers_core::{
    abi::{self, Abi, Event, Function, ParamType, RawLog, Token},
    types::{Address, Log, H256, U256},
    utils::keccak256,
};

pub const RATING_SUBMITTED: &str = "RatingSubmitted";
pub const RATING_REMOVED: &str = "RatingRemoved";
pub const URI_REVEALED: &str = "UriRevealed";

/// The selector of the standard `Error(string)` revert.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `RatingSubmitted(bytes32 indexed uri, address indexed rater, uint8 score, uint64 stake, uint64 posted, bool resubmit)`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RatingSubmitted {
    pub uri_hash: UriHash,
    pub rater: Address,
    pub score: u8,
    pub stake: u64,
    pub posted: u64,
    pub resubmit: bool,
    pub position: LogPosition,
}

/// `RatingRemoved(bytes32 indexed uri, address indexed rater, bool cleanup)`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RatingRemoved {
    pub uri_hash: UriHash,
    pub rater: Address,
    pub cleanup: bool,
    pub position: LogPosition,
}

/// `UriRevealed(bytes32 indexed uriHash, string uri)`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UriRevealed {
    pub uri_hash: UriHash,
    pub uri: String,
    pub position: LogPosition,
}

/// Any event the Ratings contract emits.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RatingsEvent {
    Submitted(RatingSubmitted),
    Removed(RatingRemoved),
    Revealed(UriRevealed),
}

impl RatingsEvent {
    pub fn position(&self) -> LogPosition {
        match self {
            RatingsEvent::Submitted(e) => e.position,
            RatingsEvent::Removed(e) => e.position,
            RatingsEvent::Revealed(e) => e.position,
        }
    }
}

/// The rating struct returned by `getRating`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct OnChainRating {
    pub score: u8,
    pub posted: u64,
    pub stake: u64,
}

/// The parsed ABI of the Ratings contract.
#[derive(Debug, Clone)]
pub struct RatingsAbi {
    abi: Abi,
}

impl RatingsAbi {
    pub fn new(abi: Abi) -> Result<Self> {
        // Fail early rather than on the first call that needs a missing item.
        for name in ["submitRating", "removeRating", "getRating", "MIN_STAKE", "STAKE_PER_SECOND"] {
            abi.function(name)?;
        }
        for name in [RATING_SUBMITTED, RATING_REMOVED, URI_REVEALED] {
            abi.event(name)?;
        }
        Ok(Self { abi })
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let abi: Abi = serde_json::from_value(value)
            .map_err(|e| RatingsError::InvalidDeploymentsFile(e.to_string()))?;
        Self::new(abi)
    }

    fn function(&self, name: &str) -> Result<&Function> {
        Ok(self.abi.function(name)?)
    }

    fn event(&self, name: &str) -> Result<&Event> {
        Ok(self.abi.event(name)?)
    }

    /// The topic0 values of every event the state mirror follows.
    pub fn event_topics(&self) -> Result<Vec<H256>> {
        [URI_REVEALED, RATING_SUBMITTED, RATING_REMOVED]
            .into_iter()
            .map(|name| Ok(self.event(name)?.signature()))
            .collect()
    }

    pub fn encode_submit_rating(&self, uri: &str, score: Score) -> Result<Vec<u8>> {
        Ok(self.function("submitRating")?.encode_input(&[
            Token::String(uri.to_string()),
            Token::Uint(U256::from(score.get())),
        ])?)
    }

    pub fn encode_remove_rating(&self, uri: &str, rater: Address) -> Result<Vec<u8>> {
        Ok(self
            .function("removeRating")?
            .encode_input(&[Token::String(uri.to_string()), Token::Address(rater)])?)
    }

    pub fn encode_get_rating(&self, uri_hash: UriHash, rater: Address) -> Result<Vec<u8>> {
        Ok(self.function("getRating")?.encode_input(&[
            Token::FixedBytes(uri_hash.as_bytes().to_vec()),
            Token::Address(rater),
        ])?)
    }

    pub fn decode_get_rating(&self, output: &[u8]) -> Result<OnChainRating> {
        let tokens = self.function("getRating")?.decode_output(output)?;
        let fields = match tokens.into_iter().next() {
            Some(Token::Tuple(fields)) => fields,
            other => {
                return Err(RatingsError::MalformedLog(format!(
                    "getRating returned {other:?}"
                )))
            }
        };
        let mut fields = fields.into_iter();
        Ok(OnChainRating {
            score: uint_field(fields.next(), "score")? as u8,
            posted: uint_field(fields.next(), "posted")?,
            stake: uint_field(fields.next(), "stake")?,
        })
    }

    pub fn encode_constant(&self, name: &'static str) -> Result<Vec<u8>> {
        Ok(self.function(name)?.encode_input(&[])?)
    }

    pub fn decode_constant(&self, name: &'static str, output: &[u8]) -> Result<u64> {
        let tokens = self.function(name)?.decode_output(output)?;
        uint_field(tokens.into_iter().next(), name)
    }

    /// Decode a raw log into a typed event.
    ///
    /// Pending logs carry no position and cannot be ordered against the cache, so they
    /// are rejected here.
    pub fn decode_log(&self, log: &Log) -> Result<RatingsEvent> {
        let topic0 = *log
            .topics
            .first()
            .ok_or_else(|| RatingsError::MalformedLog("log has no topics".into()))?;
        let position = log_position(log)?;
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };

        if topic0 == self.event(RATING_SUBMITTED)?.signature() {
            let mut params = self.event(RATING_SUBMITTED)?.parse_log(raw)?.params.into_iter();
            Ok(RatingsEvent::Submitted(RatingSubmitted {
                uri_hash: bytes32_field(params.next().map(|p| p.value), "uri")?,
                rater: address_field(params.next().map(|p| p.value), "rater")?,
                score: uint_field(params.next().map(|p| p.value), "score")? as u8,
                stake: uint_field(params.next().map(|p| p.value), "stake")?,
                posted: uint_field(params.next().map(|p| p.value), "posted")?,
                resubmit: bool_field(params.next().map(|p| p.value), "resubmit")?,
                position,
            }))
        } else if topic0 == self.event(RATING_REMOVED)?.signature() {
            let mut params = self.event(RATING_REMOVED)?.parse_log(raw)?.params.into_iter();
            Ok(RatingsEvent::Removed(RatingRemoved {
                uri_hash: bytes32_field(params.next().map(|p| p.value), "uri")?,
                rater: address_field(params.next().map(|p| p.value), "rater")?,
                cleanup: bool_field(params.next().map(|p| p.value), "cleanup")?,
                position,
            }))
        } else if topic0 == self.event(URI_REVEALED)?.signature() {
            let mut params = self.event(URI_REVEALED)?.parse_log(raw)?.params.into_iter();
            Ok(RatingsEvent::Revealed(UriRevealed {
                uri_hash: bytes32_field(params.next().map(|p| p.value), "uriHash")?,
                uri: match params.next().map(|p| p.value) {
                    Some(Token::String(uri)) => uri,
                    other => {
                        return Err(RatingsError::MalformedLog(format!(
                            "expected string uri, got {other:?}"
                        )))
                    }
                },
                position,
            }))
        } else {
            Err(RatingsError::UnknownEvent(topic0))
        }
    }

    /// Turn the data of a reverted call into something a person can read.
    pub fn decode_revert(&self, data: &[u8]) -> String {
        if data.len() < 4 {
            return "execution reverted".to_string();
        }
        let (selector, args) = data.split_at(4);

        if selector == ERROR_STRING_SELECTOR {
            if let Ok(tokens) = abi::decode(&[ParamType::String], args) {
                if let Some(Token::String(reason)) = tokens.into_iter().next() {
                    return reason;
                }
            }
        }

        for error in self.abi.errors() {
            let types: Vec<ParamType> = error.inputs.iter().map(|p| p.kind.clone()).collect();
            let signature = format!(
                "{}({})",
                error.name,
                types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(",")
            );
            if keccak256(signature.as_bytes())[..4] != *selector {
                continue;
            }
            let rendered = match abi::decode(&types, args) {
                Ok(tokens) => tokens
                    .iter()
                    .map(render_token)
                    .collect::<Vec<_>>()
                    .join(", "),
                Err(_) => format!("0x{}", hex::encode(args)),
            };
            return format!("{}({})", error.name, rendered);
        }

        format!("execution reverted: 0x{}", hex::encode(data))
    }
}

fn log_position(log: &Log) -> Result<LogPosition> {
    let block_number = log
        .block_number
        .ok_or_else(|| RatingsError::MalformedLog("pending log has no block number".into()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| RatingsError::MalformedLog("pending log has no log index".into()))?;
    Ok(LogPosition::new(
        block_number.as_u64(),
        u256_to_u64(log_index, "logIndex")?,
    ))
}

fn u256_to_u64(value: U256, field: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(RatingsError::MalformedLog(format!(
            "{field} does not fit in 64 bits"
        )));
    }
    Ok(value.as_u64())
}

fn uint_field(token: Option<Token>, field: &str) -> Result<u64> {
    match token {
        Some(Token::Uint(value)) => u256_to_u64(value, field),
        other => Err(RatingsError::MalformedLog(format!(
            "expected uint {field}, got {other:?}"
        ))),
    }
}

fn bool_field(token: Option<Token>, field: &str) -> Result<bool> {
    match token {
        Some(Token::Bool(value)) => Ok(value),
        other => Err(RatingsError::MalformedLog(format!(
            "expected bool {field}, got {other:?}"
        ))),
    }
}

fn address_field(token: Option<Token>, field: &str) -> Result<Address> {
    match token {
        Some(Token::Address(address)) => Ok(address),
        other => Err(RatingsError::MalformedLog(format!(
            "expected address {field}, got {other:?}"
        ))),
    }
}

fn bytes32_field(token: Option<Token>, field: &str) -> Result<H256> {
    match token {
        Some(Token::FixedBytes(bytes)) if bytes.len() == 32 => Ok(H256::from_slice(&bytes)),
        other => Err(RatingsError::MalformedLog(format!(
            "expected bytes32 {field}, got {other:?}"
        ))),
    }
}

fn render_token(token: &Token) -> String {
    match token {
        Token::Address(a) => format!("{a:?}"),
        Token::FixedBytes(b) | Token::Bytes(b) => format!("0x{}", hex::encode(b)),
        Token::Uint(u) | Token::Int(u) => u.to_string(),
        Token::Bool(b) => b.to_string(),
        Token::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}
