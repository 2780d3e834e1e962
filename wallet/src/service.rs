//! Connection management: which chain, which endpoints, which account, and the
//! contract wrapper built on top of them.

use std::sync::{Arc, Weak};

use chainrater_core::{Deployments, RatingRemoved, RatingSubmitted, RatingsState, UriRevealed};
use ethers_core::types::Address;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    chain::{chain_from_id, Chain, DEFAULT_CHAIN},
    config::Config,
    error::{Result, ServiceError},
    ratings::{Ratings, RatingsSettings},
    rpc, LOG_TARGET,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    /// Connected through a public endpoint only
    ReadOnly,
    /// Connected with a wallet that can sign
    Writeable,
}

impl ConnectionStatus {
    pub fn ready(self) -> bool {
        matches!(self, Self::ReadOnly | Self::Writeable)
    }
}

/// Everything subscribers of the service hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    StatusChanged(ConnectionStatus),
    AccountChanged(Option<Address>),
    Connected { chain_id: u64 },
    Disconnected,
    UrisRevealed(Vec<UriRevealed>),
    RatingsSubmitted(Vec<RatingSubmitted>),
    RatingsRemoved(Vec<RatingRemoved>),
}

pub struct BlockchainService {
    config: Config,
    deployments: Deployments,
    status: RwLock<ConnectionStatus>,
    chain: RwLock<Option<Chain>>,
    account: Arc<RwLock<Option<Address>>>,
    ratings: RwLock<Option<Arc<Ratings>>>,
    wallet: RwLock<Option<Arc<HttpClient>>>,
    /// The chain the wallet endpoint was on when last asked
    wallet_chain: RwLock<Option<u64>>,
    events: broadcast::Sender<ServiceEvent>,
    provider_watch: Mutex<Option<JoinHandle<()>>>,
}

fn client(url: &str) -> Result<Arc<HttpClient>> {
    // https://github.com/paritytech/jsonrpsee/blob/master/examples/examples/http.rs
    Ok(Arc::new(HttpClientBuilder::default().build(url)?))
}

impl BlockchainService {
    pub fn new(config: Config, deployments: Deployments) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            account: Arc::new(RwLock::new(config.account)),
            config,
            deployments,
            status: RwLock::new(ConnectionStatus::Disconnected),
            chain: RwLock::new(None),
            ratings: RwLock::new(None),
            wallet: RwLock::new(None),
            wallet_chain: RwLock::new(None),
            events,
            provider_watch: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn ready(&self) -> bool {
        self.status().ready()
    }

    pub fn chain(&self) -> Option<Chain> {
        *self.chain.read()
    }

    pub fn account(&self) -> Option<Address> {
        *self.account.read()
    }

    /// The contract wrapper of the current connection.
    pub fn ratings(&self) -> Result<Arc<Ratings>> {
        self.ratings.read().clone().ok_or(ServiceError::NotConnected)
    }

    fn publish(&self, event: ServiceEvent) {
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = std::mem::replace(&mut *self.status.write(), status);
        if previous != status {
            log::debug!(target: LOG_TARGET, "Status {previous:?} -> {status:?}");
            self.publish(ServiceEvent::StatusChanged(status));
        }
    }

    pub fn set_account(&self, account: Option<Address>) {
        let previous = std::mem::replace(&mut *self.account.write(), account);
        if previous != account {
            log::info!(target: LOG_TARGET, "Account is now {account:?}");
            self.publish(ServiceEvent::AccountChanged(account));
        }
    }

    /// Connect to `chain_id`, or to the configured chain, or to whatever chain the
    /// wallet is on, or to Polygon. Replays the contract's history before returning.
    pub async fn connect(&self, chain_id: Option<u64>) -> Result<()> {
        self.set_status(ConnectionStatus::Connecting);
        match self.try_connect(chain_id).await {
            Ok(status) => {
                self.set_status(status);
                Ok(())
            }
            Err(err) => {
                log::warn!(target: LOG_TARGET, "Connecting failed: {err}");
                self.disconnect();
                Err(err)
            }
        }
    }

    async fn try_connect(&self, chain_id: Option<u64>) -> Result<ConnectionStatus> {
        if let Some(previous) = self.ratings.write().take() {
            previous.shutdown();
        }
        let wallet = self.config.wallet_url.as_deref().map(client).transpose()?;

        let wallet_chain = match &wallet {
            Some(wallet) => Some(rpc::chain_id(wallet).await?),
            None => None,
        };
        let chain_id = chain_id
            .or(self.config.chain_id)
            .or(wallet_chain)
            .unwrap_or(DEFAULT_CHAIN.id);
        let chain = chain_from_id(chain_id)?;
        let public = client(self.config.rpc_url.as_deref().unwrap_or(chain.rpc_url))?;
        log::info!(target: LOG_TARGET, "Connecting to {} ({})", chain.name, chain.id);

        if self.config.account.is_none() {
            let account = match &wallet {
                Some(wallet) => rpc::request_accounts(wallet).await?.first().copied(),
                None => None,
            };
            self.set_account(account);
        }

        let ratings = Arc::new(Ratings::new(
            self.deployments.ratings_address(chain.id)?,
            self.deployments.ratings_abi()?,
            public,
            wallet.clone(),
            self.account.clone(),
            Arc::new(RwLock::new(RatingsState::new())),
            self.events.clone(),
            RatingsSettings {
                poll_interval: self.config.poll_interval,
                confirmation_timeout: self.config.confirmation_timeout,
                log_chunk_size: self.config.log_chunk_size,
            },
        ));
        ratings.init().await?;

        let status = if wallet.is_some() {
            ConnectionStatus::Writeable
        } else {
            ConnectionStatus::ReadOnly
        };
        *self.chain.write() = Some(chain);
        *self.wallet.write() = wallet;
        *self.wallet_chain.write() = wallet_chain;
        *self.ratings.write() = Some(ratings);
        self.publish(ServiceEvent::Connected { chain_id: chain.id });
        Ok(status)
    }

    /// Drop the connection, stop watching the chain and clear the cache.
    pub fn disconnect(&self) {
        if let Some(ratings) = self.ratings.write().take() {
            ratings.shutdown();
        }
        *self.chain.write() = None;
        *self.wallet.write() = None;
        *self.wallet_chain.write() = None;
        let was_connected = self.status() != ConnectionStatus::Disconnected;
        self.set_status(ConnectionStatus::Disconnected);
        if was_connected {
            self.publish(ServiceEvent::Disconnected);
        }
    }

    pub async fn reconnect(&self, chain_id: Option<u64>) -> Result<()> {
        self.disconnect();
        self.connect(chain_id).await
    }

    /// Follow the wallet endpoint's chain and account. A chain switch reconnects, an
    /// account switch updates the account and an unreachable wallet disconnects.
    /// The watch ends once the service is disconnected.
    ///
    /// Does nothing without a wallet endpoint.
    pub fn watch_provider(self: &Arc<Self>) {
        if self.config.wallet_url.is_none() {
            return;
        }
        let service: Weak<Self> = Arc::downgrade(self);
        let poll_interval = self.config.poll_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                if service.status() == ConnectionStatus::Disconnected {
                    log::debug!(target: LOG_TARGET, "Service disconnected, no longer watching the wallet");
                    break;
                }
                if let Err(err) = service.check_provider().await {
                    log::warn!(target: LOG_TARGET, "Wallet endpoint unreachable, disconnecting: {err}");
                    service.disconnect();
                    break;
                }
            }
        });
        if let Some(previous) = self.provider_watch.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Poll the wallet endpoint once. Errors only when the endpoint cannot be reached;
    /// a failed reconnect after a chain switch is logged and leaves the service
    /// disconnected.
    async fn check_provider(&self) -> Result<()> {
        let Some(wallet) = self.wallet.read().clone() else {
            return Ok(());
        };

        let chain_id = rpc::chain_id(&wallet).await?;
        let previous = *self.wallet_chain.read();
        if previous != Some(chain_id) {
            log::info!(
                target: LOG_TARGET,
                "Wallet switched from chain {previous:?} to {chain_id}, reconnecting"
            );
            if let Err(err) = self.reconnect(Some(chain_id)).await {
                log::warn!(target: LOG_TARGET, "Reconnecting to chain {chain_id} failed: {err}");
            }
            return Ok(());
        }

        if self.config.account.is_none() {
            let account = rpc::accounts(&wallet).await?.first().copied();
            self.set_account(account);
        }
        Ok(())
    }
}

impl Drop for BlockchainService {
    fn drop(&mut self) {
        if let Some(handle) = self.provider_watch.get_mut().take() {
            handle.abort();
        }
    }
}
