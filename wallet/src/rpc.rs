//! Strongly typed helper functions for communicating with an Ethereum
//! JSON-RPC endpoint.

use ethers_core::types::{Address, Bytes, Log, H256, U256, U64};
use jsonrpsee::{
    core::{client::ClientT, Error as RpcError},
    http_client::HttpClient,
    rpc_params,
    types::error::CallError,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The transaction object shared by `eth_call` and `eth_sendTransaction`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: Address,
    /// One entry per topic position. Each entry matches any of the hashes it holds.
    pub topics: Vec<Vec<H256>>,
    pub from_block: U64,
    pub to_block: U64,
}

/// The parts of a transaction receipt the client cares about.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: Option<U64>,
    /// `0x1` on success, `0x0` when the transaction reverted
    pub status: Option<U64>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status != Some(U64::zero())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BlockHeader {
    pub number: Option<U64>,
    pub timestamp: U256,
}

/// Typed helper to get the endpoint's chain id
pub async fn chain_id(client: &HttpClient) -> Result<u64> {
    let id: U64 = client.request("eth_chainId", rpc_params![]).await?;
    Ok(id.as_u64())
}

/// Typed helper to get the accounts the endpoint manages
pub async fn accounts(client: &HttpClient) -> Result<Vec<Address>> {
    Ok(client.request("eth_accounts", rpc_params![]).await?)
}

/// Ask the wallet to expose its accounts. Endpoints that do not know
/// `eth_requestAccounts` are asked for `eth_accounts` instead.
pub async fn request_accounts(client: &HttpClient) -> Result<Vec<Address>> {
    match client
        .request::<Vec<Address>, _>("eth_requestAccounts", rpc_params![])
        .await
    {
        Ok(accounts) => Ok(accounts),
        Err(err) => {
            log::debug!("eth_requestAccounts failed, falling back to eth_accounts: {err}");
            accounts(client).await
        }
    }
}

/// Typed helper to get the height of the best block
pub async fn block_number(client: &HttpClient) -> Result<u64> {
    let number: U64 = client.request("eth_blockNumber", rpc_params![]).await?;
    Ok(number.as_u64())
}

/// Typed helper to get the header fields of the latest block
pub async fn latest_block(client: &HttpClient) -> Result<Option<BlockHeader>> {
    Ok(client
        .request("eth_getBlockByNumber", rpc_params!["latest", false])
        .await?)
}

/// Execute a call against the latest state without creating a transaction
pub async fn call(request: &CallRequest, client: &HttpClient) -> Result<Bytes> {
    Ok(client
        .request("eth_call", rpc_params![request, "latest"])
        .await?)
}

pub async fn get_logs(filter: &LogFilter, client: &HttpClient) -> Result<Vec<Log>> {
    Ok(client.request("eth_getLogs", rpc_params![filter]).await?)
}

/// Hand a transaction to the endpoint for signing and broadcast. Returns its hash.
pub async fn send_transaction(request: &CallRequest, client: &HttpClient) -> Result<H256> {
    Ok(client
        .request("eth_sendTransaction", rpc_params![request])
        .await?)
}

/// `None` while the transaction is still pending
pub async fn transaction_receipt(hash: H256, client: &HttpClient) -> Result<Option<Receipt>> {
    Ok(client
        .request("eth_getTransactionReceipt", rpc_params![hash])
        .await?)
}

/// Pull the revert payload out of a failed call, if the node sent one.
///
/// Nodes put it in the error's `data` member, either as a hex string or as an
/// object with a hex `data` field.
pub fn revert_data(err: &RpcError) -> Option<Vec<u8>> {
    let RpcError::Call(CallError::Custom(object)) = err else {
        return None;
    };
    let data: serde_json::Value = serde_json::from_str(object.data()?.get()).ok()?;
    let hex_data = match &data {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(map) => map.get("data")?.as_str()?,
        _ => return None,
    };
    hex::decode(crate::strip_0x_prefix(hex_data)).ok()
}

/// The error message of a failed call, without jsonrpsee's framing.
pub fn error_message(err: &RpcError) -> String {
    match err {
        RpcError::Call(CallError::Custom(object)) => object.message().to_string(),
        other => other.to_string(),
    }
}
