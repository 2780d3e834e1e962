//! Settings come from an optional TOML file, overridden by command line flags.
//!
//! ```toml
//! rpc_url = "http://127.0.0.1:8545"
//! wallet_url = "http://127.0.0.1:8545"
//! chain_id = 31337
//! poll_interval_ms = 1000
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use ethers_core::types::Address;
use serde::Deserialize;

use crate::cli::Cli;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4_000);
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// The on-disk configuration. Every field is optional.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub rpc_url: Option<String>,
    pub wallet_url: Option<String>,
    pub chain_id: Option<u64>,
    pub account: Option<Address>,
    pub deployments: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub confirmation_timeout_secs: Option<u64>,
    /// Largest block range requested in one `eth_getLogs` call
    pub log_chunk_size: Option<u64>,
}

impl ConfigFile {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load the file named on the command line, which must exist, or else the one in
    /// the platform config directory, which may be absent.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => {
                log::debug!("Using config file {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// Fully resolved settings for one run of the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Public endpoint for reads. Falls back to the chain's default endpoint.
    pub rpc_url: Option<String>,
    /// Endpoint that holds the signing accounts. Without it the client is read only.
    pub wallet_url: Option<String>,
    pub chain_id: Option<u64>,
    pub account: Option<Address>,
    pub deployments: Option<PathBuf>,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub log_chunk_size: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: None,
            wallet_url: None,
            chain_id: None,
            account: None,
            deployments: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            log_chunk_size: None,
        }
    }
}

impl Config {
    pub fn resolve(cli: &Cli, file: ConfigFile) -> Self {
        Self {
            rpc_url: cli.rpc_url.clone().or(file.rpc_url),
            wallet_url: cli.wallet_url.clone().or(file.wallet_url),
            chain_id: cli.chain_id.or(file.chain_id),
            account: cli.account.or(file.account),
            deployments: cli.deployments.clone().or(file.deployments),
            poll_interval: cli
                .poll_interval_ms
                .or(file.poll_interval_ms)
                .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis),
            confirmation_timeout: file
                .confirmation_timeout_secs
                .map_or(DEFAULT_CONFIRMATION_TIMEOUT, Duration::from_secs),
            log_chunk_size: file.log_chunk_size.filter(|size| *size > 0),
        }
    }
}

/// Generate the platform-specific default config file path
pub fn default_config_path() -> Option<PathBuf> {
    // This uses the directories crate.
    // https://docs.rs/directories/latest/directories/struct.ProjectDirs.html
    let application = env!("CARGO_PKG_NAME");

    directories::ProjectDirs::from("", "", application)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
