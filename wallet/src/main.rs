//! A command line client for ChainRater, stake-backed ratings of anything that has a URI.
//!
//! Every run connects, rebuilds the ratings cache from the contract's logs and then
//! performs one command.

use std::{path::Path, sync::Arc};

use anyhow::Context;
use chainrater_core::Deployments;
use clap::Parser;
use ethers_core::types::{Address, H256};
use serde::Serialize;

mod browse;
mod chain;
mod cli;
mod config;
mod error;
mod rate;
mod ratings;
mod rpc;
mod service;
mod sync;
#[cfg(test)]
mod test_node;

use cli::{Cli, Command};
use config::{Config, ConfigFile};
use service::BlockchainService;

/// Target of every log line the wallet emits
const LOG_TARGET: &str = "chainrater";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line args
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.log_level {
        logger.filter_level(level);
    }
    logger.init();

    let file = ConfigFile::discover(cli.config.as_deref())?;
    let config = Config::resolve(&cli, file);
    let deployments = load_deployments(config.deployments.as_deref())?;

    let service = Arc::new(BlockchainService::new(config, deployments));
    service.connect(None).await?;
    log::debug!(target: LOG_TARGET, "Connected with status {:?}", service.status());

    // Dispatch to proper subcommand
    let json = cli.json;
    let result = match cli.command {
        Command::Status => browse::print_status(&service, json),
        Command::Ratings(args) => browse::print_ratings(&service, args, json).await,
        Command::Rating { uri, rater } => browse::print_rating(&service, &uri, rater, json).await,
        Command::Uris(args) => browse::print_uris(&service, args, json).await,
        Command::Dashboard => browse::print_dashboard(&service, json).await,
        Command::People => browse::print_people(&service, json),
        Command::Search { query, kind } => {
            browse::print_search(&service, &query, kind.into(), json).await
        }
        Command::Submit(args) => rate::submit(&service, args, json).await,
        Command::Remove { uri } => rate::remove(&service, &uri, json).await,
        Command::Cleanup { uri, rater } => rate::cleanup(&service, uri, rater, json).await,
        Command::Watch => {
            service.watch_provider();
            browse::watch(&service).await
        }
    };

    service.disconnect();
    result
}

/// Read the deployments manifest at `path`, or the one compiled into the binary.
fn load_deployments(path: Option<&Path>) -> anyhow::Result<Deployments> {
    match path {
        Some(path) => Deployments::load(path)
            .with_context(|| format!("loading deployments from {}", path.display())),
        None => Ok(Deployments::embedded()?),
    }
}

pub(crate) fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a string into an H256, such as a URI hash
pub(crate) fn h256_from_string(s: &str) -> anyhow::Result<H256> {
    let s = strip_0x_prefix(s);

    let mut bytes: [u8; 32] = [0; 32];
    hex::decode_to_slice(s, &mut bytes as &mut [u8])
        .map_err(|_| clap::Error::new(clap::error::ErrorKind::ValueValidation))?;
    Ok(H256::from(bytes))
}

/// Parse a string into an account address
pub(crate) fn address_from_string(s: &str) -> anyhow::Result<Address> {
    let s = strip_0x_prefix(s);

    let mut bytes: [u8; 20] = [0; 20];
    hex::decode_to_slice(s, &mut bytes as &mut [u8])
        .map_err(|_| clap::Error::new(clap::error::ErrorKind::ValueValidation))?;
    Ok(Address::from(bytes))
}

/// Takes a string and checks for a 0x prefix. Returns a string without a 0x prefix.
pub(crate) fn strip_0x_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}
