//! The chains the client knows how to talk to.

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    pub id: u64,
    pub name: &'static str,
    /// Public RPC endpoint used when none is configured
    pub rpc_url: &'static str,
}

pub const MAINNET: Chain = Chain {
    id: 1,
    name: "Ethereum",
    rpc_url: "https://eth.merkle.io",
};

pub const SEPOLIA: Chain = Chain {
    id: 11_155_111,
    name: "Sepolia",
    rpc_url: "https://sepolia.drpc.org",
};

pub const FOUNDRY: Chain = Chain {
    id: 31_337,
    name: "Foundry",
    rpc_url: "http://127.0.0.1:8545",
};

pub const POLYGON: Chain = Chain {
    id: 137,
    name: "Polygon",
    rpc_url: "https://polygon-rpc.com",
};

pub const SUPPORTED_CHAINS: [Chain; 4] = [MAINNET, SEPOLIA, FOUNDRY, POLYGON];

/// Used when neither the configuration nor a wallet names a chain.
pub const DEFAULT_CHAIN: Chain = POLYGON;

pub fn chain_from_id(id: u64) -> Result<Chain> {
    SUPPORTED_CHAINS
        .into_iter()
        .find(|chain| chain.id == id)
        .ok_or(ServiceError::BadChain(id))
}
