//! An in-process Ethereum JSON-RPC node for the wallet's tests. It knows just enough
//! of the Ratings contract to answer the calls the wallet makes.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chainrater_core::{hash_uri, Deployments, RatingsAbi};
use ethers_core::{
    abi::{self, Token},
    types::{Address, Bytes, Log, H256, U256, U64},
};
use jsonrpsee::{
    core::Error as RpcError,
    server::{ServerBuilder, ServerHandle},
    types::error::{CallError, ErrorObject},
    RpcModule,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::{config::Config, service::ServiceEvent};

pub const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const ALICE: Address = Address::repeat_byte(0xa1);
pub const BOB: Address = Address::repeat_byte(0xb0);

pub struct NodeState {
    pub chain_id: u64,
    pub accounts: Vec<Address>,
    pub block_number: u64,
    pub timestamp: u64,
    pub min_stake: u64,
    pub stake_per_second: u64,
    pub logs: Vec<Log>,
    /// `(uri hash, rater) -> (score, posted, stake)`
    pub ratings: BTreeMap<(H256, Address), (u8, u64, u64)>,
    /// Revert payload returned by every write simulation when set
    pub revert: Option<Vec<u8>>,
    pub receipt_status: u64,
    /// Receipts are never returned while set
    pub pending_receipts: bool,
    /// `eth_chainId` and the account queries fail while set
    pub wallet_down: bool,
    /// `eth_getBlockByNumber` fails while set
    pub blocks_unavailable: bool,
    /// Number of `eth_getLogs` calls served
    pub log_queries: usize,
    pub sent: Vec<Value>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            chain_id: 31_337,
            accounts: vec![ALICE],
            block_number: 10,
            timestamp: 1_000,
            min_stake: 1,
            stake_per_second: 1,
            logs: Vec::new(),
            ratings: BTreeMap::new(),
            revert: None,
            receipt_status: 1,
            pending_receipts: false,
            wallet_down: false,
            blocks_unavailable: false,
            log_queries: 0,
            sent: Vec::new(),
        }
    }
}

pub struct MockNode {
    pub url: String,
    pub state: Arc<Mutex<NodeState>>,
    pub abi: RatingsAbi,
    _handle: ServerHandle,
}

fn contract() -> Address {
    CONTRACT.parse().expect("valid contract address")
}

fn quantity(n: u64) -> Value {
    json!(format!("0x{n:x}"))
}

fn bad_params(err: impl std::fmt::Display) -> RpcError {
    RpcError::Custom(err.to_string())
}

fn unavailable(method: &str) -> RpcError {
    RpcError::Custom(format!("{method} unavailable"))
}

fn selector(data: &[u8]) -> &[u8] {
    &data[..data.len().min(4)]
}

fn ratings_abi() -> RatingsAbi {
    Deployments::embedded()
        .and_then(|d| d.ratings_abi())
        .expect("embedded manifest is valid")
}

impl MockNode {
    pub async fn start(state: NodeState) -> Self {
        let state = Arc::new(Mutex::new(state));
        let abi = ratings_abi();
        let mut module = RpcModule::new(state.clone());

        module
            .register_method("eth_chainId", |_, node| {
                let node = node.lock();
                if node.wallet_down {
                    return Err(unavailable("eth_chainId"));
                }
                Ok(quantity(node.chain_id))
            })
            .unwrap();
        for method in ["eth_accounts", "eth_requestAccounts"] {
            module
                .register_method(method, move |_, node| {
                    let node = node.lock();
                    if node.wallet_down {
                        return Err(unavailable(method));
                    }
                    Ok(json!(node.accounts))
                })
                .unwrap();
        }
        module
            .register_method("eth_blockNumber", |_, node| {
                Ok(quantity(node.lock().block_number))
            })
            .unwrap();
        module
            .register_method("eth_getBlockByNumber", |_, node| {
                let node = node.lock();
                if node.blocks_unavailable {
                    return Err(unavailable("eth_getBlockByNumber"));
                }
                Ok(json!({
                    "number": quantity(node.block_number),
                    "timestamp": quantity(node.timestamp),
                }))
            })
            .unwrap();
        module
            .register_method("eth_getLogs", |params, node| {
                let params: Vec<Value> = params.parse().map_err(bad_params)?;
                let filter = params.first().cloned().unwrap_or_default();
                let from: U64 = serde_json::from_value(filter["fromBlock"].clone()).map_err(bad_params)?;
                let to: U64 = serde_json::from_value(filter["toBlock"].clone()).map_err(bad_params)?;
                let mut node = node.lock();
                node.log_queries += 1;
                let logs: Vec<&Log> = node
                    .logs
                    .iter()
                    .filter(|log| {
                        log.block_number
                            .map_or(false, |block| block >= from && block <= to)
                    })
                    .collect();
                Ok(json!(logs))
            })
            .unwrap();

        let call_abi = abi.clone();
        module
            .register_method("eth_call", move |params, node| {
                let params: Vec<Value> = params.parse().map_err(bad_params)?;
                let request = params.first().cloned().unwrap_or_default();
                let data: Bytes =
                    serde_json::from_value(request["data"].clone()).map_err(bad_params)?;
                let node = node.lock();

                let min_stake = call_abi.encode_constant("MIN_STAKE").map_err(bad_params)?;
                let per_second = call_abi.encode_constant("STAKE_PER_SECOND").map_err(bad_params)?;
                let get_rating = call_abi
                    .encode_get_rating(H256::zero(), Address::zero())
                    .map_err(bad_params)?;

                let output = if selector(&data) == selector(&min_stake) {
                    abi::encode(&[Token::Uint(node.min_stake.into())])
                } else if selector(&data) == selector(&per_second) {
                    abi::encode(&[Token::Uint(node.stake_per_second.into())])
                } else if selector(&data) == selector(&get_rating) {
                    let uri_hash = H256::from_slice(&data[4..36]);
                    let rater = Address::from_slice(&data[48..68]);
                    let (score, posted, stake) =
                        node.ratings.get(&(uri_hash, rater)).copied().unwrap_or_default();
                    abi::encode(&[Token::Tuple(vec![
                        Token::Uint(score.into()),
                        Token::Uint(posted.into()),
                        Token::Uint(stake.into()),
                    ])])
                } else if let Some(revert) = &node.revert {
                    return Err(RpcError::Call(CallError::Custom(ErrorObject::owned(
                        3,
                        "execution reverted",
                        Some(format!("0x{}", hex::encode(revert))),
                    ))));
                } else {
                    Vec::new()
                };
                Ok(json!(Bytes::from(output)))
            })
            .unwrap();

        module
            .register_method("eth_sendTransaction", |params, node| {
                let params: Vec<Value> = params.parse().map_err(bad_params)?;
                let mut node = node.lock();
                node.sent.extend(params.into_iter().take(1));
                node.block_number += 1;
                Ok(json!(H256::from_low_u64_be(node.sent.len() as u64)))
            })
            .unwrap();
        module
            .register_method("eth_getTransactionReceipt", |params, node| {
                let params: Vec<Value> = params.parse().map_err(bad_params)?;
                let node = node.lock();
                if node.pending_receipts {
                    return Ok(Value::Null);
                }
                Ok(json!({
                    "transactionHash": params.first().cloned().unwrap_or_default(),
                    "blockNumber": quantity(node.block_number),
                    "status": quantity(node.receipt_status),
                }))
            })
            .unwrap();

        let server = ServerBuilder::default()
            .build("127.0.0.1:0")
            .await
            .expect("mock node binds");
        let url = format!("http://{}", server.local_addr().expect("bound address"));
        let handle = server.start(module).expect("mock node starts");

        Self {
            url,
            state,
            abi,
            _handle: handle,
        }
    }

    fn topic(&self, index: usize) -> H256 {
        self.abi.event_topics().expect("topics")[index]
    }

    fn log(&self, topics: Vec<H256>, data: Vec<u8>, block: u64, index: u64) -> Log {
        Log {
            address: contract(),
            topics,
            data: Bytes::from(data),
            block_number: Some(U64::from(block)),
            log_index: Some(U256::from(index)),
            ..Default::default()
        }
    }

    pub fn revealed_log(&self, uri: &str, block: u64, index: u64) -> Log {
        self.log(
            vec![self.topic(0), hash_uri(uri)],
            abi::encode(&[Token::String(uri.to_string())]),
            block,
            index,
        )
    }

    pub fn submitted_log(
        &self,
        uri: &str,
        rater: Address,
        score: u8,
        stake: u64,
        block: u64,
        index: u64,
    ) -> Log {
        self.log(
            vec![self.topic(1), hash_uri(uri), H256::from(rater)],
            abi::encode(&[
                Token::Uint(score.into()),
                Token::Uint(stake.into()),
                Token::Uint(1_000u64.into()),
                Token::Bool(false),
            ]),
            block,
            index,
        )
    }

    pub fn removed_log(&self, uri: &str, rater: Address, block: u64, index: u64) -> Log {
        self.log(
            vec![self.topic(2), hash_uri(uri), H256::from(rater)],
            abi::encode(&[Token::Bool(false)]),
            block,
            index,
        )
    }

    /// Settings pointing the service at this node. With `wallet` the node also acts as
    /// the signing endpoint and the chain id is asked of it.
    pub fn config(&self, wallet: bool) -> Config {
        Config {
            rpc_url: Some(self.url.clone()),
            wallet_url: wallet.then(|| self.url.clone()),
            chain_id: (!wallet).then_some(31_337),
            poll_interval: Duration::from_millis(50),
            confirmation_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// The embedded manifest with the contract also deployed on `chain_id`.
    pub fn deployments_on(chain_id: u64) -> Deployments {
        let mut deployments = Deployments::embedded().expect("embedded manifest is valid");
        deployments
            .contracts
            .get_mut(chainrater_core::deployments::RATINGS)
            .expect("Ratings is listed")
            .addresses
            .insert(chain_id.to_string(), CONTRACT.to_string());
        deployments
    }

    /// Mine a block holding `logs`.
    pub fn mine(&self, logs: impl FnOnce(&Self, u64) -> Vec<Log>) {
        let block = self.state.lock().block_number + 1;
        let logs = logs(self, block);
        let mut node = self.state.lock();
        node.block_number = block;
        node.logs.extend(logs);
    }
}

/// Wait for the first event accepted by `want`, failing the test after a few seconds.
pub async fn next_event(
    events: &mut broadcast::Receiver<ServiceEvent>,
    want: impl Fn(&ServiceEvent) -> bool,
) -> ServiceEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if want(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event arrives in time")
}
