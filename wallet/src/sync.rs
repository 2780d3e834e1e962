//! This module is responsible for keeping the wallet's in-memory mirror of the
//! Ratings contract in step with the chain.
//!
//! The mirror is rebuilt from the contract's logs on every connect. Nothing is
//! persisted between runs.
//!
//! ## Replay
//!
//! When a contract wrapper initialises, every log of the three followed events
//! from block 0 through the current best block is fetched and applied in
//! `(block, log index)` order.
//!
//! ## Watching
//!
//! A tokio task then polls the endpoint every poll interval and applies the logs in
//! `[next_block, best]`. A failed poll is logged and retried on the next tick. The
//! task is aborted when the wallet disconnects.
//!
//! ## Schema
//!
//! | Event           | Topics                   | Effect on the mirror                      |
//! |-----------------|--------------------------|-------------------------------------------|
//! | `UriRevealed`   | `uriHash`                | record the hash to URI mapping            |
//! | `RatingSubmitted` | `uri`, `rater`         | insert or replace the rating              |
//! | `RatingRemoved` | `uri`, `rater`           | replace the rating with a deleted marker  |

use std::{sync::Arc, time::Duration};

use chainrater_core::{Changes, RatingsAbi, RatingsEvent, RatingsState};
use ethers_core::types::{Address, H256, U64};
use jsonrpsee::http_client::HttpClient;
use parking_lot::RwLock;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    error::Result,
    rpc::{self, LogFilter},
    service::ServiceEvent,
    LOG_TARGET,
};

/// Everything needed to pull this contract's logs into the shared mirror.
#[derive(Clone)]
pub struct Mirror {
    pub client: Arc<HttpClient>,
    pub abi: Arc<RatingsAbi>,
    pub address: Address,
    pub topics: Vec<H256>,
    /// Largest block range requested at once. `None` asks for everything in one go.
    pub chunk_size: Option<u64>,
    pub state: Arc<RwLock<RatingsState>>,
    pub events: broadcast::Sender<ServiceEvent>,
}

/// Split `[from, to]` into inclusive ranges of at most `chunk_size` blocks.
pub fn block_ranges(from: u64, to: u64, chunk_size: Option<u64>) -> Vec<(u64, u64)> {
    if from > to {
        return Vec::new();
    }
    let Some(size) = chunk_size.filter(|size| *size > 0) else {
        return vec![(from, to)];
    };
    let mut ranges = Vec::new();
    let mut start = from;
    loop {
        let end = start.saturating_add(size - 1).min(to);
        ranges.push((start, end));
        if end == to {
            break;
        }
        start = end + 1;
    }
    ranges
}

impl Mirror {
    /// Fetch and decode the followed events in `[from, to]`.
    ///
    /// Logs that were reorged out or that do not decode are skipped with a warning.
    pub async fn fetch_events(&self, from: u64, to: u64) -> Result<Vec<RatingsEvent>> {
        let mut events = Vec::new();
        for (start, end) in block_ranges(from, to, self.chunk_size) {
            let filter = LogFilter {
                address: self.address,
                topics: vec![self.topics.clone()],
                from_block: U64::from(start),
                to_block: U64::from(end),
            };
            let logs = rpc::get_logs(&filter, &self.client).await?;
            log::debug!(target: LOG_TARGET, "Fetched {} logs from blocks {start}..={end}", logs.len());

            for log in logs {
                if log.removed == Some(true) {
                    continue;
                }
                match self.abi.decode_log(&log) {
                    Ok(event) => events.push(event),
                    Err(err) => log::warn!(
                        target: LOG_TARGET,
                        "Skipping undecodable log in tx {:?}: {err}",
                        log.transaction_hash
                    ),
                }
            }
        }
        Ok(events)
    }

    /// Apply the events in `[from, to]` to the mirror and announce what changed.
    pub async fn sync_range(&self, from: u64, to: u64) -> Result<Changes> {
        let events = self.fetch_events(from, to).await?;
        let changes = self.state.write().apply_all(events);
        if !changes.is_empty() {
            log::info!(
                target: LOG_TARGET,
                "Applied {} submissions, {} removals and {} reveals",
                changes.submitted.len(),
                changes.removed.len(),
                changes.revealed.len(),
            );
            publish(&self.events, &changes);
        }
        Ok(changes)
    }

    /// One poll of the watcher. Returns the next block to start from.
    pub async fn poll(&self, next_block: u64) -> Result<u64> {
        let best = rpc::block_number(&self.client).await?;
        if best < next_block {
            return Ok(next_block);
        }
        self.sync_range(next_block, best).await?;
        Ok(best + 1)
    }

    /// Start following the chain from `next_block`.
    pub fn spawn_watcher(self, mut next_block: u64, poll_interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                match self.poll(next_block).await {
                    Ok(next) => next_block = next,
                    Err(err) => log::warn!(target: LOG_TARGET, "Log watcher poll failed: {err}"),
                }
            }
        })
    }
}

/// Send each kind of change that happened to subscribers.
pub fn publish(events: &broadcast::Sender<ServiceEvent>, changes: &Changes) {
    // Sending only fails when nobody is subscribed.
    if !changes.revealed.is_empty() {
        let _ = events.send(ServiceEvent::UrisRevealed(changes.revealed.clone()));
    }
    if !changes.submitted.is_empty() {
        let _ = events.send(ServiceEvent::RatingsSubmitted(changes.submitted.clone()));
    }
    if !changes.removed.is_empty() {
        let _ = events.send(ServiceEvent::RatingsRemoved(changes.removed.clone()));
    }
}
