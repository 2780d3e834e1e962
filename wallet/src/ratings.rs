//! The wallet's handle on one deployment of the Ratings contract.
//!
//! Reads are answered from the shared in-memory mirror, except `get_rating` which
//! asks the contract directly. Writes are simulated with `eth_call`, sent through
//! the wallet endpoint and considered done after one confirmation.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chainrater_core::{
    hash_uri, ExistingRating, LogPosition, Rating, RatingFilter, RatingsAbi, RatingsState,
    Score, Selection, UriHash,
};
use ethers_core::types::{Address, Bytes, H256, U256};
use jsonrpsee::http_client::HttpClient;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    error::{Result, ServiceError},
    rpc::{self, CallRequest, Receipt},
    service::ServiceEvent,
    sync::Mirror,
    LOG_TARGET,
};

/// How often a pending transaction's receipt is polled for.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingsSettings {
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub log_chunk_size: Option<u64>,
}

pub struct Ratings {
    address: Address,
    abi: Arc<RatingsAbi>,
    public: Arc<HttpClient>,
    wallet: Option<Arc<HttpClient>>,
    account: Arc<RwLock<Option<Address>>>,
    state: Arc<RwLock<RatingsState>>,
    events: broadcast::Sender<ServiceEvent>,
    settings: RatingsSettings,
    initialized: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Ratings {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        abi: RatingsAbi,
        public: Arc<HttpClient>,
        wallet: Option<Arc<HttpClient>>,
        account: Arc<RwLock<Option<Address>>>,
        state: Arc<RwLock<RatingsState>>,
        events: broadcast::Sender<ServiceEvent>,
        settings: RatingsSettings,
    ) -> Self {
        Self {
            address,
            abi: Arc::new(abi),
            public,
            wallet,
            account,
            state,
            events,
            settings,
            initialized: AtomicBool::new(false),
            watcher: Mutex::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn mirror(&self) -> Result<Mirror> {
        Ok(Mirror {
            client: self.public.clone(),
            abi: self.abi.clone(),
            address: self.address,
            topics: self.abi.event_topics()?,
            chunk_size: self.settings.log_chunk_size,
            state: self.state.clone(),
            events: self.events.clone(),
        })
    }

    /// Read the contract constants, replay the contract's history into the mirror and
    /// start following new blocks.
    pub async fn init(&self) -> Result<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ServiceError::AlreadyInitialized("Ratings"));
        }

        match self.replay().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.initialized.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn replay(&self) -> Result<()> {
        let min_stake = self.read_constant("MIN_STAKE").await?;
        let stake_per_second = self.read_constant("STAKE_PER_SECOND").await?;
        self.state.write().set_constants(min_stake, stake_per_second);
        log::debug!(
            target: LOG_TARGET,
            "Ratings at {:?}: min stake {min_stake}, stake per second {stake_per_second}",
            self.address
        );

        let best = rpc::block_number(&self.public).await?;
        let mirror = self.mirror()?;
        mirror.sync_range(0, best).await?;
        let (ratings, uris) = self.with_state(|s| (s.rating_count(), s.uri_count()));
        log::info!(
            target: LOG_TARGET,
            "Replayed history to block {best}: {ratings} ratings of {uris} URIs"
        );

        let handle = mirror.spawn_watcher(best + 1, self.settings.poll_interval);
        if let Some(previous) = self.watcher.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn read_constant(&self, name: &'static str) -> Result<u64> {
        let request = CallRequest {
            to: self.address,
            data: Bytes::from(self.abi.encode_constant(name)?),
            ..Default::default()
        };
        let output = rpc::call(&request, &self.public).await?;
        Ok(self.abi.decode_constant(name, &output)?)
    }

    /// Stop following the chain and forget everything cached.
    pub fn shutdown(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
        self.state.write().clear();
        self.initialized.store(false, Ordering::SeqCst);
    }

    pub fn account(&self) -> Option<Address> {
        *self.account.read()
    }

    pub fn min_stake(&self) -> Result<u64> {
        Ok(self.state.read().min_stake()?)
    }

    pub fn stake_per_second(&self) -> Result<u64> {
        Ok(self.state.read().stake_per_second()?)
    }

    pub fn get_ratings(&self, filter: &RatingFilter, now: u64) -> Result<Selection> {
        Ok(self.state.read().get_ratings(filter, now)?)
    }

    pub fn existing_ratings(&self, filter: &RatingFilter, now: u64) -> Result<Vec<ExistingRating>> {
        Ok(self.state.read().existing_ratings(filter, now)?)
    }

    pub fn raters(&self) -> BTreeMap<Address, Vec<Rating>> {
        self.state.read().raters()
    }

    pub fn uri_from_hash(&self, hash: &UriHash) -> Result<String> {
        Ok(self.state.read().uri_from_hash(hash)?.to_string())
    }

    /// Remember a URI locally before its reveal event has been seen.
    pub fn cache_uri(&self, uri: &str) -> UriHash {
        self.state.write().cache_uri(uri)
    }

    /// Run `f` against the mirror while holding the read lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&RatingsState) -> R) -> R {
        f(&self.state.read())
    }

    /// The timestamp of the best block, or the local clock when the node will not say.
    pub async fn now(&self) -> u64 {
        match rpc::latest_block(&self.public).await {
            Ok(Some(block)) if block.timestamp <= U256::from(u64::MAX) => block.timestamp.as_u64(),
            other => {
                if let Err(err) = other {
                    log::debug!(target: LOG_TARGET, "Falling back to the local clock: {err}");
                }
                chrono::Utc::now().timestamp().max(0) as u64
            }
        }
    }

    /// Ask the contract for `rater`'s rating of `uri`. `None` when there is none.
    pub async fn get_rating(&self, uri: &str, rater: Address) -> Result<Option<ExistingRating>> {
        let uri_hash = hash_uri(uri);
        let request = CallRequest {
            to: self.address,
            data: Bytes::from(self.abi.encode_get_rating(uri_hash, rater)?),
            ..Default::default()
        };
        let output = rpc::call(&request, &self.public).await?;
        let rating = self.abi.decode_get_rating(&output)?;
        if rating.stake == 0 {
            return Ok(None);
        }
        Ok(Some(ExistingRating {
            uri_hash,
            rater,
            score: rating.score,
            posted: rating.posted,
            stake: rating.stake,
            latest: LogPosition::default(),
        }))
    }

    /// Rate `uri`, locking up `stake` wei.
    pub async fn submit_rating(&self, uri: &str, score: Score, stake: u64) -> Result<Receipt> {
        let from = self.account().ok_or(ServiceError::MissingAccount)?;
        let request = CallRequest {
            from: Some(from),
            to: self.address,
            data: Bytes::from(self.abi.encode_submit_rating(uri, score)?),
            value: Some(U256::from(stake)),
        };
        log::debug!(target: LOG_TARGET, "Submitting score {} for {uri} with stake {stake}", score.get());
        self.write(request).await
    }

    /// Remove `rater`'s rating of `uri`. Anyone may remove an expired rating.
    pub async fn remove_rating(&self, uri: &str, rater: Address) -> Result<Receipt> {
        let from = self.account().ok_or(ServiceError::MissingAccount)?;
        let request = CallRequest {
            from: Some(from),
            to: self.address,
            data: Bytes::from(self.abi.encode_remove_rating(uri, rater)?),
            value: None,
        };
        log::debug!(target: LOG_TARGET, "Removing rating of {uri} by {rater:?}");
        self.write(request).await
    }

    async fn write(&self, request: CallRequest) -> Result<Receipt> {
        let wallet = self.wallet.as_ref().ok_or(ServiceError::MissingWeb3)?;
        self.simulate(&request).await?;
        let hash = rpc::send_transaction(&request, wallet).await?;
        log::info!(target: LOG_TARGET, "Sent transaction {hash:?}");
        self.wait_for_confirmation(hash).await
    }

    /// Dry run a write so its revert reason surfaces before anything is signed.
    async fn simulate(&self, request: &CallRequest) -> Result<()> {
        match rpc::call(request, &self.public).await {
            Ok(_) => Ok(()),
            Err(ServiceError::Rpc(err)) => {
                let reason = rpc::revert_data(&err)
                    .map(|data| self.abi.decode_revert(&data))
                    .unwrap_or_else(|| rpc::error_message(&err));
                Err(ServiceError::Simulation(reason))
            }
            Err(other) => Err(ServiceError::Simulation(other.to_string())),
        }
    }

    async fn wait_for_confirmation(&self, hash: H256) -> Result<Receipt> {
        let poll_receipt = async {
            loop {
                match rpc::transaction_receipt(hash, &self.public).await? {
                    Some(receipt) if receipt.block_number.is_some() => {
                        return Ok::<_, ServiceError>(receipt)
                    }
                    _ => tokio::time::sleep(RECEIPT_POLL_INTERVAL).await,
                }
            }
        };
        let receipt: Receipt = tokio::time::timeout(self.settings.confirmation_timeout, poll_receipt)
            .await
            .map_err(|_| ServiceError::ConfirmationTimeout(hash))??;

        if !receipt.succeeded() {
            return Err(ServiceError::Reverted(hash));
        }
        log::info!(target: LOG_TARGET, "Transaction {hash:?} confirmed in block {:?}", receipt.block_number);
        Ok(receipt)
    }
}

impl Drop for Ratings {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().take() {
            handle.abort();
        }
    }
}
