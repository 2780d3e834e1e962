//! ChainRater Wallet's Command Line Interface.
//!
//! Built with clap's derive macros.

use std::path::PathBuf;

use chainrater_core::{
    search::SearchKind,
    stats::{SortBy, SortDirection},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ethers_core::types::{Address, H256};

use crate::{address_from_string, h256_from_string};

/// The wallet's main CLI struct
#[derive(Debug, Parser)]
#[command(about, version)]
pub struct Cli {
    #[arg(long, short)]
    /// Public RPC endpoint used for reads, log queries and receipts.
    ///
    /// Defaults to the public endpoint of the selected chain.
    pub rpc_url: Option<String>,

    #[arg(long, short)]
    /// RPC endpoint of a node that manages and signs for your accounts.
    /// Without it the wallet is read only.
    pub wallet_url: Option<String>,

    #[arg(long)]
    /// Chain to connect to. Defaults to the wallet endpoint's chain, or Polygon.
    pub chain_id: Option<u64>,

    #[arg(long, short, value_parser = address_from_string)]
    /// Account to rate as. Defaults to the first account of the wallet endpoint.
    pub account: Option<Address>,

    #[arg(long, short)]
    /// Path to a deployments manifest. Defaults to the one built into the binary.
    pub deployments: Option<PathBuf>,

    #[arg(long, short)]
    /// Path to a TOML config file.
    ///
    /// Default value is platform specific
    pub config: Option<PathBuf>,

    #[arg(long)]
    /// How often to poll the chain for new logs, in milliseconds.
    pub poll_interval_ms: Option<u64>,

    #[arg(long, global = true)]
    /// Log verbosity (`error`, `warn`, `info`, `debug`, `trace`). Overrides `RUST_LOG`.
    pub log_level: Option<log::LevelFilter>,

    #[arg(long, global = true)]
    /// Print results as JSON instead of text.
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// The tasks supported by the wallet
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the connection status, the chain, the account and the size of the cache.
    Status,

    /// List cached ratings, optionally filtered.
    Ratings(RatingsArgs),

    /// Read one rating directly from the contract, bypassing the cache.
    Rating {
        /// The rated URI, like `book://dune`
        uri: String,

        /// Whose rating to read. Defaults to your account.
        #[arg(long, short, value_parser = address_from_string)]
        rater: Option<Address>,
    },

    /// Summarise every rated URI.
    Uris(UrisArgs),

    /// Show the value locked and the top staked, top rated and most controversial URIs.
    Dashboard,

    /// Summarise every rater.
    People,

    /// Search the cache.
    Search {
        /// The URI to look up. Cleanup searches ignore it.
        #[arg(default_value = "")]
        query: String,

        #[arg(long, short, value_enum, default_value_t = SearchKindArg::All)]
        kind: SearchKindArg,
    },

    /// Rate a URI, locking up a stake for as long as the rating should last.
    Submit(SubmitArgs),

    /// Remove your rating of a URI and reclaim what is left of the stake.
    Remove {
        uri: String,
    },

    /// Remove someone else's expired rating. Without both a URI and a rater, list the
    /// ratings that can be cleaned up.
    Cleanup {
        #[arg(long, short)]
        uri: Option<String>,

        #[arg(long, short, value_parser = address_from_string)]
        rater: Option<Address>,
    },

    /// Stay connected and print rating activity as it lands on chain.
    Watch,
}

#[derive(Debug, Args)]
pub struct RatingsArgs {
    #[arg(long, short)]
    pub uri: Option<String>,

    #[arg(long, value_parser = h256_from_string, conflicts_with = "uri")]
    pub uri_hash: Option<H256>,

    #[arg(long, short, value_parser = address_from_string)]
    pub rater: Option<Address>,

    /// Only your own ratings.
    #[arg(long, conflicts_with = "rater")]
    pub mine: bool,

    /// Only expired (`true`) or unexpired (`false`) ratings. Requires `--deleted false`.
    #[arg(long)]
    pub expired: Option<bool>,

    /// Only deleted (`true`) or existing (`false`) ratings. Both are listed by default.
    #[arg(long)]
    pub deleted: Option<bool>,
}

#[derive(Debug, Args)]
pub struct UrisArgs {
    #[arg(long, short, value_enum, default_value_t = SortArg::Ratings)]
    pub sort: SortArg,

    /// Sort ascending instead of descending.
    #[arg(long)]
    pub asc: bool,

    /// Only URIs you have rated.
    #[arg(long)]
    pub yours: bool,

    /// Only URIs containing this text.
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// The URI to rate, like `restaurant://chez-panisse`
    pub uri: String,

    /// A score from 1 to 5
    #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
    pub score: u8,

    /// How many weeks the rating should last. The stake is derived from the contract's
    /// price per second.
    #[arg(long, conflicts_with = "stake")]
    pub weeks: Option<u64>,

    /// Stake to lock up, in ETH. Cannot be combined with `--weeks`.
    #[arg(long)]
    pub stake: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Ratings,
    Stake,
    Score,
    Variance,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Ratings => SortBy::Ratings,
            SortArg::Stake => SortBy::Stake,
            SortArg::Score => SortBy::Score,
            SortArg::Variance => SortBy::Variance,
        }
    }
}

impl UrisArgs {
    pub fn direction(&self) -> SortDirection {
        if self.asc {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchKindArg {
    All,
    Rate,
    Guide,
    Cleanup,
}

impl From<SearchKindArg> for SearchKind {
    fn from(arg: SearchKindArg) -> Self {
        match arg {
            SearchKindArg::All => SearchKind::All,
            SearchKindArg::Rate => SearchKind::Rate,
            SearchKindArg::Guide => SearchKind::Guide,
            SearchKindArg::Cleanup => SearchKind::Cleanup,
        }
    }
}
