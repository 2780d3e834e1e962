//! The deployment manifest: which address the contracts live at on each chain, and their ABIs.
//!
//! The manifest is generated from the contract build artifacts. A copy is embedded in this
//! crate so clients work out of the box, and it can be replaced at runtime.

use std::{collections::BTreeMap, path::Path};

use crate::{
    contract::RatingsAbi,
    error::{RatingsError, Result},
};
use ethers_core::types::Address;
use serde::Deserialize;

/// The name the Ratings contract is listed under.
pub const RATINGS: &str = "Ratings";

const EMBEDDED: &str = include_str!("../deployments.json");

#[derive(Deserialize, Debug, Clone)]
pub struct ContractDeployment {
    pub abi: serde_json::Value,
    /// Chain id (as a decimal string) to deployed address
    pub addresses: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Deployments {
    pub contracts: BTreeMap<String, ContractDeployment>,
}

impl Deployments {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RatingsError::InvalidDeploymentsFile(e.to_string()))
    }

    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            RatingsError::InvalidDeploymentsFile(format!("{}: {e}", path.display()))
        })?;
        Self::parse(&json)
    }

    fn contract(&self, name: &str) -> Result<&ContractDeployment> {
        self.contracts
            .get(name)
            .ok_or_else(|| RatingsError::InvalidDeploymentsFile(format!("no {name} contract")))
    }

    /// The address the named contract is deployed at on the given chain.
    pub fn address_for(&self, name: &str, chain_id: u64) -> Result<Address> {
        let address = self
            .contract(name)?
            .addresses
            .get(&chain_id.to_string())
            .ok_or(RatingsError::BadChain(chain_id))?;

        if !address.starts_with("0x") {
            return Err(RatingsError::InvalidDeploymentsFile(format!(
                "address {address} is not 0x-prefixed"
            )));
        }
        address
            .parse::<Address>()
            .map_err(|e| RatingsError::InvalidDeploymentsFile(format!("address {address}: {e}")))
    }

    pub fn ratings_address(&self, chain_id: u64) -> Result<Address> {
        self.address_for(RATINGS, chain_id)
    }

    pub fn ratings_abi(&self) -> Result<RatingsAbi> {
        RatingsAbi::from_json(self.contract(RATINGS)?.abi.clone())
    }
}
